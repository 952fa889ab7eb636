//! Move data

use super::Type;

/// Which defensive stat a move is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveCategory {
    /// attack vs defense
    Physical,
    /// sp_attack vs sp_defense
    Special,
    /// Non-damaging; the calculator returns zero damage.
    Status,
}

impl MoveCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "physical" => Some(MoveCategory::Physical),
            "special" => Some(MoveCategory::Special),
            "status" => Some(MoveCategory::Status),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MoveCategory::Physical => "Physical",
            MoveCategory::Special => "Special",
            MoveCategory::Status => "Status",
        }
    }
}

/// Static data for one move.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveData {
    pub name: String,
    pub move_type: Type,
    pub power: u32,
    pub category: MoveCategory,
}

impl MoveData {
    pub fn new(name: &str, move_type: Type, power: u32, category: MoveCategory) -> Self {
        Self {
            name: name.to_string(),
            move_type,
            power,
            category,
        }
    }
}
