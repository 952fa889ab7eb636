//! One peer's view of the battle.
//!
//! Both peers hold a `BattleState`; the turn protocol keeps them convergent.
//! After every confirmed turn the two copies agree on turn number and on both
//! combatants' HP.

use std::collections::HashMap;

use pokeproto_protocol::StatBoosts;

use crate::repository::PokemonData;
use crate::types::{type_multipliers, BaseStats, Type};

/// Battle lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Handshake done, waiting for both BATTLE_SETUPs.
    SetupExchanging,
    /// Between turns; the side whose turn it is may announce an attack.
    WaitingForMove,
    /// Inside the announce/defense/report/confirm exchange.
    ProcessingTurn,
    GameOver,
}

/// One side's active pokemon.
#[derive(Debug, Clone, PartialEq)]
pub struct Combatant {
    pub pokemon_name: String,
    pub stats: BaseStats,
    pub types: Vec<Type>,
    /// Attacker-type → damage multiplier when this combatant defends.
    pub type_multipliers: HashMap<Type, f64>,
    pub current_hp: u32,
    pub boosts: StatBoosts,
}

impl Combatant {
    /// Build a combatant at full health from repository data.
    pub fn new(data: &PokemonData, boosts: StatBoosts) -> Self {
        Self {
            pokemon_name: data.name.clone(),
            stats: data.stats,
            type_multipliers: type_multipliers(&data.types),
            types: data.types.clone(),
            current_hp: data.stats.hp,
            boosts,
        }
    }

    pub fn max_hp(&self) -> u32 {
        self.stats.hp
    }

    pub fn is_fainted(&self) -> bool {
        self.current_hp == 0
    }

    /// Consume one special-attack boost if any remain. Both peers apply the
    /// same rule, so the consumed flag never travels on the wire.
    pub fn consume_sp_attack_boost(&mut self) -> bool {
        if self.boosts.sp_attack_uses > 0 {
            self.boosts.sp_attack_uses -= 1;
            true
        } else {
            false
        }
    }
}

/// One peer's computed outcome for the turn in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub damage_dealt: u32,
    pub defender_hp_after: u32,
    pub attacker_hp_after: u32,
    pub status_message: String,
}

/// Bookkeeping for the announce/defense/report/confirm exchange.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    pub attacker_is_local: bool,
    /// The attacking pokemon's name.
    pub attacker_name: String,
    pub move_name: String,
    pub local_result: Option<TurnReport>,
    /// Stashed opponent report, in case it outruns our own computation.
    pub remote_result: Option<TurnReport>,
    pub confirm_sent: bool,
    pub confirm_received: bool,
    pub resolution_sent: bool,
}

impl PendingTurn {
    pub fn new(attacker_is_local: bool, attacker_name: String, move_name: String) -> Self {
        Self {
            attacker_is_local,
            attacker_name,
            move_name,
            local_result: None,
            remote_result: None,
            confirm_sent: false,
            confirm_received: false,
            resolution_sent: false,
        }
    }
}

/// The battle as seen from one peer.
#[derive(Debug, Clone)]
pub struct BattleState {
    /// Current turn, starting at 1.
    pub turn: u32,
    pub phase: Phase,
    /// Host-issued session seed.
    pub seed: u32,
    pub local: Option<Combatant>,
    pub opponent: Option<Combatant>,
    pub pending: Option<PendingTurn>,
}

impl BattleState {
    pub fn new() -> Self {
        Self {
            turn: 1,
            phase: Phase::SetupExchanging,
            seed: 0,
            local: None,
            opponent: None,
            pending: None,
        }
    }

    pub fn both_sides_ready(&self) -> bool {
        self.local.is_some() && self.opponent.is_some()
    }

    /// Write a turn's agreed outcome into both combatants. Absolute HP values
    /// make re-application of a duplicate report a no-op.
    pub fn apply_turn(&mut self, attacker_is_local: bool, report: &TurnReport) {
        let (attacker, defender) = if attacker_is_local {
            (&mut self.local, &mut self.opponent)
        } else {
            (&mut self.opponent, &mut self.local)
        };
        if let Some(attacker) = attacker {
            attacker.current_hp = report.attacker_hp_after;
        }
        if let Some(defender) = defender {
            defender.current_hp = report.defender_hp_after;
        }
    }

    /// Close out a confirmed turn. Returns the new turn number.
    pub fn advance_turn(&mut self) -> u32 {
        self.turn += 1;
        self.pending = None;
        self.turn
    }

    /// The turn's defender, given who attacked.
    pub fn defender(&self, attacker_is_local: bool) -> Option<&Combatant> {
        if attacker_is_local {
            self.opponent.as_ref()
        } else {
            self.local.as_ref()
        }
    }
}

impl Default for BattleState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{PokemonStatsRepository, StaticRepository};

    fn combatant(name: &str) -> Combatant {
        let repo = StaticRepository::new();
        Combatant::new(&repo.pokemon(name).unwrap(), StatBoosts::default())
    }

    #[test]
    fn combatant_starts_at_full_health() {
        let pikachu = combatant("Pikachu");
        assert_eq!(pikachu.current_hp, pikachu.max_hp());
        assert!(!pikachu.is_fainted());
    }

    #[test]
    fn boost_consumption_drains_counter() {
        let repo = StaticRepository::new();
        let mut c = Combatant::new(
            &repo.pokemon("Pikachu").unwrap(),
            StatBoosts {
                sp_attack_uses: 1,
                sp_defense_uses: 0,
            },
        );
        assert!(c.consume_sp_attack_boost());
        assert!(!c.consume_sp_attack_boost());
    }

    #[test]
    fn apply_turn_is_idempotent() {
        let mut state = BattleState::new();
        state.local = Some(combatant("Pikachu"));
        state.opponent = Some(combatant("Bulbasaur"));

        let report = TurnReport {
            damage_dealt: 17,
            defender_hp_after: 28,
            attacker_hp_after: 35,
            status_message: String::new(),
        };
        state.apply_turn(true, &report);
        state.apply_turn(true, &report);

        assert_eq!(state.opponent.as_ref().unwrap().current_hp, 28);
        assert_eq!(state.local.as_ref().unwrap().current_hp, 35);
    }

    #[test]
    fn advance_turn_clears_pending() {
        let mut state = BattleState::new();
        state.pending = Some(PendingTurn::new(
            true,
            "Pikachu".to_string(),
            "Thunderbolt".to_string(),
        ));
        assert_eq!(state.advance_turn(), 2);
        assert!(state.pending.is_none());
    }
}
