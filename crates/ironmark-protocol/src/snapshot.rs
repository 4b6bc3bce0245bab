use serde::{Deserialize, Serialize};

use crate::{Coord, EntityClassId, EntityId, EntityKind, FactionClassId, FactionId, VariableId};

/// Full world state projection for hosts, digests and determinism checks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub turn: u32,
    pub active_faction: Option<FactionId>,
    pub game_over: bool,
    pub winner: Option<FactionId>,
    pub full_turns: u32,
    pub grid: GridSnapshot,
    pub factions: Vec<FactionSnapshot>,
    pub entities: Vec<EntitySnapshot>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub width: u32,
    pub height: u32,
    /// Row-major, aligned with site coordinates.
    pub sites: Vec<SiteSnapshot>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SiteSnapshot {
    pub owner: Option<FactionId>,
    pub move_cost: i64,
    pub blocks_attack: bool,
    /// Background terrain first.
    pub terrains: Vec<EntityId>,
    pub units: Vec<EntityId>,
    pub effects: Vec<EntityId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FactionSnapshot {
    pub id: FactionId,
    pub class: FactionClassId,
    pub name: String,
    pub resigned: bool,
    pub home: Option<Coord>,
    pub sites: Vec<Coord>,
    pub units: Vec<EntityId>,
    pub terrains: Vec<EntityId>,
    pub upgrades: Vec<EntityId>,
    #[serde(default)]
    pub counters: Vec<VariableValue>,
    #[serde(default)]
    pub resources: Vec<VariableValue>,
}

/// Compact entity state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub class: EntityClassId,
    pub kind: EntityKind,
    pub name: String,
    pub owner: Option<FactionId>,
    pub at: Option<Coord>,
    #[serde(default)]
    pub attributes: Vec<VariableValue>,
    #[serde(default)]
    pub counters: Vec<VariableValue>,
    #[serde(default)]
    pub resources: Vec<VariableValue>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableValue {
    pub class: VariableId,
    pub initial: i64,
    pub value: i64,
}
