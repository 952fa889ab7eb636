//! The deterministic damage calculator.
//!
//! Both peers run this function with identical inputs and an identically
//! seeded PRNG; the turn protocol then cross-verifies the outputs. Every call
//! advances the PRNG exactly once, including non-damaging moves, so the two
//! streams cannot drift apart on skipped draws.

use crate::rng::Mulberry32;
use crate::state::Combatant;
use crate::types::{MoveCategory, MoveData};

/// Fixed combatant level.
pub const LEVEL: u32 = 50;

/// Result of one damage computation.
#[derive(Debug, Clone, PartialEq)]
pub struct DamageOutcome {
    pub damage: u32,
    /// Defender HP after the hit, clamped at zero.
    pub defender_hp_after: u32,
    /// The defender's multiplier against the move's type.
    pub type_multiplier: f64,
    /// Display line, e.g. "Pikachu used Thunderbolt! It's super effective!"
    pub status_message: String,
}

/// Compute the damage `attacker` deals to `defender` with `mv`.
///
/// `boost_applied` raises the attacking stat by 1.5x for this computation;
/// callers must consume the boost identically on both peers before calling.
pub fn compute_damage(
    attacker: &Combatant,
    defender: &Combatant,
    mv: &MoveData,
    boost_applied: bool,
    rng: &mut Mulberry32,
) -> DamageOutcome {
    // One draw per call, before any early return.
    let roll = rng.next_f64();
    let random_modifier = 0.85 + roll * 0.15;

    let (attack_stat, defense_stat) = match mv.category {
        MoveCategory::Physical => (attacker.stats.attack, defender.stats.defense),
        MoveCategory::Special => (attacker.stats.sp_attack, defender.stats.sp_defense),
        MoveCategory::Status => {
            return DamageOutcome {
                damage: 0,
                defender_hp_after: defender.current_hp,
                type_multiplier: 1.0,
                status_message: used_line(attacker, mv),
            };
        }
    };

    let mut attack = f64::from(attack_stat);
    if boost_applied {
        attack *= 1.5;
    }
    let defense = if defense_stat == 0 {
        1.0
    } else {
        f64::from(defense_stat)
    };

    let level = f64::from(LEVEL);
    let base =
        (((2.0 * level / 5.0 + 2.0) * f64::from(mv.power) * attack / defense) / 50.0 + 2.0).floor();

    let mut modifiers = 1.0;
    if attacker.types.contains(&mv.move_type) {
        // Same-type attack bonus.
        modifiers *= 1.5;
    }
    let type_multiplier = defender
        .type_multipliers
        .get(&mv.move_type)
        .copied()
        .unwrap_or(1.0);
    modifiers *= type_multiplier;
    modifiers *= random_modifier;

    let damage = if modifiers == 0.0 {
        0
    } else {
        ((base * modifiers).floor() as u32).max(1)
    };

    let mut status_message = used_line(attacker, mv);
    if let Some(note) = effectiveness_note(type_multiplier, &defender.pokemon_name) {
        status_message.push(' ');
        status_message.push_str(&note);
    }

    DamageOutcome {
        damage,
        defender_hp_after: defender.current_hp.saturating_sub(damage),
        type_multiplier,
        status_message,
    }
}

fn used_line(attacker: &Combatant, mv: &MoveData) -> String {
    format!("{} used {}!", attacker.pokemon_name, mv.name)
}

fn effectiveness_note(multiplier: f64, defender_name: &str) -> Option<String> {
    if multiplier == 0.0 {
        Some(format!("It doesn't affect {}...", defender_name))
    } else if multiplier >= 2.0 {
        Some("It's super effective!".to_string())
    } else if multiplier < 1.0 {
        Some("It's not very effective...".to_string())
    } else {
        None
    }
}
