//! The stats lookup seam.
//!
//! The core consumes base stats and move data through
//! [`PokemonStatsRepository`]; where that data ultimately comes from
//! (spreadsheets, an API, a bundled table) is the surrounding application's
//! business. [`StaticRepository`] ships a small built-in table sufficient for
//! the demo binaries and the test suite.

use std::collections::HashMap;

use crate::types::{BaseStats, MoveCategory, MoveData, Type};

/// Static data for one species.
#[derive(Debug, Clone, PartialEq)]
pub struct PokemonData {
    pub name: String,
    pub stats: BaseStats,
    pub types: Vec<Type>,
}

/// Lookup interface the session consumes. Names are matched
/// case-insensitively; `None` means the name is unknown.
pub trait PokemonStatsRepository: Send + Sync {
    fn pokemon(&self, name: &str) -> Option<PokemonData>;
    fn move_data(&self, name: &str) -> Option<MoveData>;
}

/// In-memory repository with a built-in roster.
pub struct StaticRepository {
    pokemon: HashMap<String, PokemonData>,
    moves: HashMap<String, MoveData>,
}

impl StaticRepository {
    pub fn new() -> Self {
        use MoveCategory::*;
        use Type::*;

        let roster = [
            ("Pikachu", BaseStats::new(35, 55, 40, 50, 50, 90), vec![Electric]),
            (
                "Bulbasaur",
                BaseStats::new(45, 49, 49, 65, 65, 45),
                vec![Grass, Poison],
            ),
            ("Charmander", BaseStats::new(39, 52, 43, 60, 50, 65), vec![Fire]),
            ("Squirtle", BaseStats::new(44, 48, 65, 50, 64, 43), vec![Water]),
            (
                "Venusaur",
                BaseStats::new(80, 82, 83, 100, 100, 80),
                vec![Grass, Poison],
            ),
            (
                "Charizard",
                BaseStats::new(78, 84, 78, 109, 85, 100),
                vec![Fire, Flying],
            ),
            ("Blastoise", BaseStats::new(79, 83, 100, 85, 105, 78), vec![Water]),
            ("Snorlax", BaseStats::new(160, 110, 65, 65, 110, 30), vec![Normal]),
            (
                "Gengar",
                BaseStats::new(60, 65, 60, 130, 75, 110),
                vec![Ghost, Poison],
            ),
        ];

        let movedex = [
            ("Tackle", Normal, 40, Physical),
            ("Quick Attack", Normal, 40, Physical),
            ("Body Slam", Normal, 85, Physical),
            ("Growl", Normal, 0, Status),
            ("Thunder Shock", Electric, 40, Special),
            ("Thunderbolt", Electric, 90, Special),
            ("Vine Whip", Grass, 45, Physical),
            ("Razor Leaf", Grass, 55, Physical),
            ("Ember", Fire, 40, Special),
            ("Flamethrower", Fire, 90, Special),
            ("Water Gun", Water, 40, Special),
            ("Surf", Water, 90, Special),
            ("Hydro Pump", Water, 110, Special),
            ("Lick", Ghost, 30, Physical),
            ("Shadow Ball", Ghost, 80, Special),
            ("Earthquake", Ground, 100, Physical),
        ];

        let pokemon = roster
            .into_iter()
            .map(|(name, stats, types)| {
                (
                    name.to_lowercase(),
                    PokemonData {
                        name: name.to_string(),
                        stats,
                        types,
                    },
                )
            })
            .collect();

        let moves = movedex
            .into_iter()
            .map(|(name, move_type, power, category)| {
                (
                    name.to_lowercase(),
                    MoveData::new(name, move_type, power, category),
                )
            })
            .collect();

        Self { pokemon, moves }
    }
}

impl Default for StaticRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl PokemonStatsRepository for StaticRepository {
    fn pokemon(&self, name: &str) -> Option<PokemonData> {
        self.pokemon.get(&name.to_lowercase()).cloned()
    }

    fn move_data(&self, name: &str) -> Option<MoveData> {
        self.moves.get(&name.to_lowercase()).cloned()
    }
}
