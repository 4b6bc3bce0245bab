use serde::{Deserialize, Serialize};

use crate::{Command, EntityClassId, FactionId};

/// One command as recorded into the history log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedCommand {
    pub turn: u32,
    pub faction: FactionId,
    pub command: Command,
}

/// Per-entity history event. `Deleted` is terminal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EntityEventKind {
    Created { class: EntityClassId },
    ClassChanged { class: EntityClassId },
    Renamed { name: String },
    Deleted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityEvent {
    pub turn: u32,
    pub kind: EntityEventKind,
}

/// Per-faction history event. Each snapshots the faction's size and strength
/// at the time it was recorded. `Deleted` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FactionEventKind {
    Created,
    Advanced,
    Deleted,
    Victory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionEvent {
    pub turn: u32,
    pub kind: FactionEventKind,
    /// Owned sites + entities at the time of the event.
    pub size: u32,
    /// Summed unit strength at the time of the event.
    pub strength: i64,
}

/// Persisted command log. Replaying `commands` against a fresh world built
/// from the same scenario reproduces the recorded game byte-for-byte.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryFile {
    /// History file schema version.
    pub version: u32,
    /// Deterministic hash of scenario content (used to reject mismatched logs).
    pub scenario_hash: u64,
    pub full_turns: u32,
    #[serde(default)]
    pub commands: Vec<RecordedCommand>,
}

pub const HISTORY_FILE_VERSION: u32 = 1;
