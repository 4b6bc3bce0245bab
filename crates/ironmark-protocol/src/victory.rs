use serde::{Deserialize, Serialize};

use crate::FactionId;

/// How a finished game ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VictoryReason {
    /// All rival factions were defeated; one faction survives.
    LastFactionStanding,
    /// Every faction was eliminated in the same command (draw).
    MutualElimination,
}

/// Result of a completed game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    pub winner: Option<FactionId>,
    pub reason: VictoryReason,
    pub turn: u32,
}
