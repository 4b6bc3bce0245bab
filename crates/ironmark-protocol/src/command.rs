use serde::{Deserialize, Serialize};

use crate::{Coord, EntityClassId, EntityId, FactionId, VariableId};

/// One build request inside a [`Command::Build`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOrder {
    pub class: EntityClassId,
    pub count: u32,
}

/// All top-level player/AI decisions. Fully serializable; each variant is a
/// named element on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Opens the active faction's turn. Only the engine's turn flow may issue it.
    BeginTurn,
    /// Closes the active faction's turn and advances to the next faction.
    EndTurn,

    // Faction commands
    Build {
        orders: Vec<BuildOrder>,
    },
    Resign,

    // Entity commands
    Deploy {
        entity: EntityId,
        at: Coord,
    },
    Move {
        unit: EntityId,
        path: Vec<Coord>,
    },
    Attack {
        attacker: EntityId,
        target: EntityId,
    },
    Rename {
        entity: EntityId,
        name: String,
    },
    Transform {
        entity: EntityId,
        class: EntityClassId,
    },
}

impl Command {
    /// BeginTurn/EndTurn bracket turn boundaries and are excluded from ad hoc queueing.
    pub fn is_turn_bracket(&self) -> bool {
        matches!(self, Command::BeginTurn | Command::EndTurn)
    }
}

/// The owner of a variable value addressed by an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VariableTarget {
    Entity { entity: EntityId },
    Faction { faction: FactionId },
}

/// Atomic, replayable state mutations. A validated command expands into a
/// program of these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Instruction {
    CreateEntity {
        class: EntityClassId,
        owner: FactionId,
        #[serde(default)]
        name: Option<String>,
    },
    DeleteEntity {
        entity: EntityId,
    },
    PlaceEntity {
        entity: EntityId,
        at: Coord,
    },
    SetOwner {
        entity: EntityId,
        #[serde(default)]
        owner: Option<FactionId>,
    },
    SetValue {
        target: VariableTarget,
        variable: VariableId,
        value: i64,
        /// When set, writes the initial value instead of the current one.
        #[serde(default)]
        initial: bool,
    },
    AdjustValue {
        target: VariableTarget,
        variable: VariableId,
        delta: i64,
    },
    SetEntityClass {
        entity: EntityId,
        class: EntityClassId,
    },
    SetEntityName {
        entity: EntityId,
        name: String,
    },
    ResignFaction {
        faction: FactionId,
    },
    AdvanceFaction,
    /// User-visible message, optionally anchored to a site.
    Message {
        text: String,
        #[serde(default)]
        at: Option<Coord>,
    },
}
