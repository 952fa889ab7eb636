//! User input consumed by the session.

use pokeproto_protocol::ChatContent;

/// Commands arriving from the surrounding application.
#[derive(Debug, Clone, PartialEq)]
pub enum UserInput {
    /// Announce an attack with the named move. Only valid on our turn.
    ChooseMove(String),

    /// Send a chat line or sticker; legal in any phase.
    SendChat(ChatContent),

    /// Tear the session down without notifying the remote.
    Disconnect,
}
