use serde::{Deserialize, Serialize};

use crate::{
    Coord, EntityClassId, EntityId, FactionId, VariableId, VariableTarget, VictoryReason,
};

/// All engine→host notifications. Fully serializable. One event is emitted per
/// executed instruction that encodes a user-visible occurrence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // Game flow
    TurnStarted {
        turn: u32,
        faction: FactionId,
    },
    TurnEnded {
        turn: u32,
        faction: FactionId,
    },
    GameEnded {
        winner: Option<FactionId>,
        reason: VictoryReason,
    },

    // Entity lifecycle
    EntityCreated {
        entity: EntityId,
        class: EntityClassId,
        owner: FactionId,
        name: String,
    },
    EntityDeleted {
        entity: EntityId,
        #[serde(default)]
        at: Option<Coord>,
    },
    EntityPlaced {
        entity: EntityId,
        at: Coord,
        #[serde(default)]
        from: Option<Coord>,
    },
    EntityRenamed {
        entity: EntityId,
        name: String,
    },
    EntityTransformed {
        entity: EntityId,
        class: EntityClassId,
    },
    OwnerChanged {
        entity: EntityId,
        #[serde(default)]
        owner: Option<FactionId>,
    },

    // Variables
    ValueChanged {
        target: VariableTarget,
        variable: VariableId,
        value: i64,
    },

    // Factions
    FactionResigned {
        faction: FactionId,
    },
    FactionDefeated {
        faction: FactionId,
    },

    // Messages
    Message {
        text: String,
        #[serde(default)]
        at: Option<Coord>,
    },
}
