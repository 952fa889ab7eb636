//! Battle domain model and deterministic calculator for PokeProtocol.
//!
//! This crate holds everything both peers must evaluate identically:
//!
//! ```text
//! pokeproto-protocol (wire format)
//!        │
//!        ▼
//! pokeproto-battle (domain types + calculator) ← THIS CRATE
//!        │
//!        └─> pokeproto-peer (reliability + state machines)
//! ```
//!
//! # Main Types
//!
//! - [`Type`] - Pokemon types with effectiveness lookups
//! - [`BaseStats`], [`MoveData`], [`MoveCategory`] - static combat data
//! - [`Mulberry32`] - the seeded PRNG shared by both peers
//! - [`compute_damage`] - the pure damage function both peers cross-verify
//! - [`BattleState`] - one peer's view of the battle, convergent by protocol
//! - [`PokemonStatsRepository`] - the lookup seam toward static data

use thiserror::Error;

pub mod calc;
pub mod repository;
pub mod rng;
pub mod state;
pub mod types;

pub use calc::{compute_damage, DamageOutcome, LEVEL};
pub use repository::{PokemonData, PokemonStatsRepository, StaticRepository};
pub use rng::Mulberry32;
pub use state::{BattleState, Combatant, PendingTurn, Phase, TurnReport};
pub use types::{BaseStats, MoveCategory, MoveData, Type};

// The boost allowances travel on the wire; the protocol crate owns them.
pub use pokeproto_protocol::StatBoosts;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BattleError {
    /// Pokemon name with no entry in the stats repository. Surfaced to the
    /// user, never sent over the wire.
    #[error("Unknown pokemon: {0}")]
    UnknownPokemon(String),

    /// Move name with no entry in the stats repository.
    #[error("Unknown move: {0}")]
    UnknownMove(String),
}
