//! Display events emitted toward the surrounding application.

use pokeproto_protocol::ChatContent;

use crate::connection::ConnectionPhase;

/// Everything the UI needs to render a battle. The core never blocks on the
/// consumer; events go out on an unbounded channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Connection status transition.
    Status(ConnectionPhase),

    /// Both setups exchanged; the battle is live.
    BattleReady { local: String, opponent: String },

    /// Whose move it is now.
    TurnIndicator { turn: u32, your_move: bool },

    /// Authoritative HP after a confirmed turn.
    HpUpdate {
        pokemon: String,
        current_hp: u32,
        max_hp: u32,
    },

    /// A battle log line ("Pikachu used Thunderbolt! ...").
    Log(String),

    Chat {
        sender: String,
        content: ChatContent,
    },

    SpectatorJoined { peer_id: String },

    GameOver { winner: String, loser: String },

    /// A local input the session could not act on (wrong turn, unknown move).
    /// Never produces an outgoing packet.
    InputRejected(String),

    /// Unrecoverable session failure (reliability exhausted, transport dead).
    Fatal(String),
}
