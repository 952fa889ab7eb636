//! Pokemon type system and effectiveness lookups

use std::collections::HashMap;

/// Pokemon types (18 types as of Gen 6+)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Normal,
    Fire,
    Water,
    Electric,
    Grass,
    Ice,
    Fighting,
    Poison,
    Ground,
    Flying,
    Psychic,
    Bug,
    Rock,
    Ghost,
    Dragon,
    Dark,
    Steel,
    Fairy,
}

impl Type {
    /// All 18 Pokemon types
    pub const ALL: [Type; 18] = [
        Type::Normal,
        Type::Fire,
        Type::Water,
        Type::Electric,
        Type::Grass,
        Type::Ice,
        Type::Fighting,
        Type::Poison,
        Type::Ground,
        Type::Flying,
        Type::Psychic,
        Type::Bug,
        Type::Rock,
        Type::Ghost,
        Type::Dragon,
        Type::Dark,
        Type::Steel,
        Type::Fairy,
    ];

    /// Effectiveness of this type attacking a single defending type.
    /// Values: 0.0 = immune, 0.5 = not very effective, 1.0 = neutral,
    /// 2.0 = super effective.
    pub fn effectiveness(self, defender: Type) -> f64 {
        for &(against, multiplier) in self.non_neutral_matchups() {
            if against == defender {
                return multiplier;
            }
        }
        1.0
    }

    /// Effectiveness against a dual-typed defender (multiplied), so composite
    /// values 0.25 and 4.0 arise here.
    pub fn effectiveness_multi(self, defenders: &[Type]) -> f64 {
        defenders.iter().map(|t| self.effectiveness(*t)).product()
    }

    /// Only the matchups that differ from neutral; everything absent is 1.0.
    fn non_neutral_matchups(self) -> &'static [(Type, f64)] {
        use Type::*;
        match self {
            Normal => &[(Rock, 0.5), (Ghost, 0.0), (Steel, 0.5)],
            Fire => &[
                (Fire, 0.5),
                (Water, 0.5),
                (Grass, 2.0),
                (Ice, 2.0),
                (Bug, 2.0),
                (Rock, 0.5),
                (Dragon, 0.5),
                (Steel, 2.0),
            ],
            Water => &[
                (Fire, 2.0),
                (Water, 0.5),
                (Grass, 0.5),
                (Ground, 2.0),
                (Rock, 2.0),
                (Dragon, 0.5),
            ],
            Electric => &[
                (Water, 2.0),
                (Electric, 0.5),
                (Grass, 0.5),
                (Ground, 0.0),
                (Flying, 2.0),
                (Dragon, 0.5),
            ],
            Grass => &[
                (Fire, 0.5),
                (Water, 2.0),
                (Grass, 0.5),
                (Poison, 0.5),
                (Ground, 2.0),
                (Flying, 0.5),
                (Bug, 0.5),
                (Rock, 2.0),
                (Dragon, 0.5),
                (Steel, 0.5),
            ],
            Ice => &[
                (Fire, 0.5),
                (Water, 0.5),
                (Grass, 2.0),
                (Ice, 0.5),
                (Ground, 2.0),
                (Flying, 2.0),
                (Dragon, 2.0),
                (Steel, 0.5),
            ],
            Fighting => &[
                (Normal, 2.0),
                (Ice, 2.0),
                (Poison, 0.5),
                (Flying, 0.5),
                (Psychic, 0.5),
                (Bug, 0.5),
                (Rock, 2.0),
                (Ghost, 0.0),
                (Dark, 2.0),
                (Steel, 2.0),
                (Fairy, 0.5),
            ],
            Poison => &[
                (Grass, 2.0),
                (Poison, 0.5),
                (Ground, 0.5),
                (Rock, 0.5),
                (Ghost, 0.5),
                (Steel, 0.0),
                (Fairy, 2.0),
            ],
            Ground => &[
                (Fire, 2.0),
                (Electric, 2.0),
                (Grass, 0.5),
                (Poison, 2.0),
                (Flying, 0.0),
                (Bug, 0.5),
                (Rock, 2.0),
                (Steel, 2.0),
            ],
            Flying => &[
                (Electric, 0.5),
                (Grass, 2.0),
                (Fighting, 2.0),
                (Bug, 2.0),
                (Rock, 0.5),
                (Steel, 0.5),
            ],
            Psychic => &[
                (Fighting, 2.0),
                (Poison, 2.0),
                (Psychic, 0.5),
                (Dark, 0.0),
                (Steel, 0.5),
            ],
            Bug => &[
                (Fire, 0.5),
                (Grass, 2.0),
                (Fighting, 0.5),
                (Poison, 0.5),
                (Flying, 0.5),
                (Psychic, 2.0),
                (Ghost, 0.5),
                (Dark, 2.0),
                (Steel, 0.5),
                (Fairy, 0.5),
            ],
            Rock => &[
                (Fire, 2.0),
                (Ice, 2.0),
                (Fighting, 0.5),
                (Ground, 0.5),
                (Flying, 2.0),
                (Bug, 2.0),
                (Steel, 0.5),
            ],
            Ghost => &[
                (Normal, 0.0),
                (Psychic, 2.0),
                (Ghost, 2.0),
                (Dark, 0.5),
            ],
            Dragon => &[(Dragon, 2.0), (Steel, 0.5), (Fairy, 0.0)],
            Dark => &[
                (Fighting, 0.5),
                (Psychic, 2.0),
                (Ghost, 2.0),
                (Dark, 0.5),
                (Fairy, 0.5),
            ],
            Steel => &[
                (Fire, 0.5),
                (Water, 0.5),
                (Electric, 0.5),
                (Ice, 2.0),
                (Rock, 2.0),
                (Steel, 0.5),
                (Fairy, 2.0),
            ],
            Fairy => &[
                (Fire, 0.5),
                (Fighting, 2.0),
                (Poison, 0.5),
                (Dragon, 2.0),
                (Dark, 2.0),
                (Steel, 0.5),
            ],
        }
    }

    /// Parse from wire text (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "normal" => Some(Type::Normal),
            "fire" => Some(Type::Fire),
            "water" => Some(Type::Water),
            "electric" => Some(Type::Electric),
            "grass" => Some(Type::Grass),
            "ice" => Some(Type::Ice),
            "fighting" => Some(Type::Fighting),
            "poison" => Some(Type::Poison),
            "ground" => Some(Type::Ground),
            "flying" => Some(Type::Flying),
            "psychic" => Some(Type::Psychic),
            "bug" => Some(Type::Bug),
            "rock" => Some(Type::Rock),
            "ghost" => Some(Type::Ghost),
            "dragon" => Some(Type::Dragon),
            "dark" => Some(Type::Dark),
            "steel" => Some(Type::Steel),
            "fairy" => Some(Type::Fairy),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Type::Normal => "Normal",
            Type::Fire => "Fire",
            Type::Water => "Water",
            Type::Electric => "Electric",
            Type::Grass => "Grass",
            Type::Ice => "Ice",
            Type::Fighting => "Fighting",
            Type::Poison => "Poison",
            Type::Ground => "Ground",
            Type::Flying => "Flying",
            Type::Psychic => "Psychic",
            Type::Bug => "Bug",
            Type::Rock => "Rock",
            Type::Ghost => "Ghost",
            Type::Dragon => "Dragon",
            Type::Dark => "Dark",
            Type::Steel => "Steel",
            Type::Fairy => "Fairy",
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-attacking-type multipliers for a defender with the given types.
///
/// This is the `type_multipliers` table the stats repository hands out: every
/// attacking type maps to a value in {0, 0.25, 0.5, 1, 2, 4}.
pub fn type_multipliers(defender_types: &[Type]) -> HashMap<Type, f64> {
    Type::ALL
        .iter()
        .map(|attacker| (*attacker, attacker.effectiveness_multi(defender_types)))
        .collect()
}
