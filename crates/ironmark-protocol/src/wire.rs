use rmp_serde::{decode, encode};
use serde_json;
use thiserror::Error;
use tracing::warn;

use crate::{Command, Event, HistoryFile, RecordedCommand, WorldSnapshot};

#[derive(Debug, Error)]
pub enum WireError {
    #[error("encode error: {0}")]
    Encode(#[from] encode::Error),
    #[error("decode error: {0}")]
    Decode(#[from] decode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("history file is not an object with a command sequence")]
    MalformedHistory,
}

pub fn serialize_command(cmd: &Command) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(cmd)?)
}

pub fn deserialize_command(bytes: &[u8]) -> Result<Command, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_events(events: &[Event]) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(events)?)
}

pub fn deserialize_events(bytes: &[u8]) -> Result<Vec<Event>, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_history(history: &HistoryFile) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(history)?)
}

pub fn deserialize_history(bytes: &[u8]) -> Result<HistoryFile, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_snapshot(snapshot: &WorldSnapshot) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(snapshot)?)
}

pub fn deserialize_snapshot(bytes: &[u8]) -> Result<WorldSnapshot, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_command_json(cmd: &Command) -> Result<String, WireError> {
    Ok(serde_json::to_string(cmd)?)
}

pub fn deserialize_command_json(json: &str) -> Result<Command, WireError> {
    Ok(serde_json::from_str(json)?)
}

pub fn serialize_events_json(events: &[Event]) -> Result<String, WireError> {
    Ok(serde_json::to_string(events)?)
}

pub fn deserialize_events_json(json: &str) -> Result<Vec<Event>, WireError> {
    Ok(serde_json::from_str(json)?)
}

pub fn serialize_history_json(history: &HistoryFile) -> Result<String, WireError> {
    Ok(serde_json::to_string(history)?)
}

pub fn serialize_snapshot_json(snapshot: &WorldSnapshot) -> Result<String, WireError> {
    Ok(serde_json::to_string(snapshot)?)
}

/// Lenient history read: command elements that fail to decode (unknown type,
/// unknown fields from a newer schema) are skipped so later elements still
/// load. Returns the decoded file plus the indices of skipped elements.
pub fn deserialize_history_json(json: &str) -> Result<(HistoryFile, Vec<usize>), WireError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let obj = value.as_object().ok_or(WireError::MalformedHistory)?;

    let version = obj
        .get("version")
        .and_then(|v| v.as_u64())
        .ok_or(WireError::MalformedHistory)? as u32;
    let scenario_hash = obj
        .get("scenario_hash")
        .and_then(|v| v.as_u64())
        .ok_or(WireError::MalformedHistory)?;
    let full_turns = obj
        .get("full_turns")
        .and_then(|v| v.as_u64())
        .ok_or(WireError::MalformedHistory)? as u32;

    let elements = match obj.get("commands") {
        Some(serde_json::Value::Array(items)) => items.as_slice(),
        None => &[],
        Some(_) => return Err(WireError::MalformedHistory),
    };

    let mut commands = Vec::with_capacity(elements.len());
    let mut skipped = Vec::new();
    for (index, element) in elements.iter().enumerate() {
        match serde_json::from_value::<RecordedCommand>(element.clone()) {
            Ok(cmd) => commands.push(cmd),
            Err(err) => {
                warn!(index, %err, "skipping unreadable history element");
                skipped.push(index);
            }
        }
    }

    Ok((
        HistoryFile {
            version,
            scenario_hash,
            full_turns,
            commands,
        },
        skipped,
    ))
}

/// Deterministic snapshot hash for desync detection and replay verification.
///
/// Hashes the MessagePack-serialized snapshot using FNV-1a 64-bit.
pub fn snapshot_hash(snapshot: &WorldSnapshot) -> Result<u64, WireError> {
    let bytes = serialize_snapshot(snapshot)?;
    Ok(hash_bytes_fnv1a64(&bytes))
}

/// Deterministic, stable 64-bit hash for raw bytes (FNV-1a).
pub fn hash_bytes_fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Coord, EntityId, FactionId};

    #[test]
    fn command_roundtrips_through_msgpack_and_json() {
        let cmd = Command::Move {
            unit: EntityId::new(3, 1),
            path: vec![Coord { x: 1, y: 1 }, Coord { x: 2, y: 1 }],
        };
        let bytes = serialize_command(&cmd).unwrap();
        assert_eq!(deserialize_command(&bytes).unwrap(), cmd);

        let json = serialize_command_json(&cmd).unwrap();
        assert_eq!(deserialize_command_json(&json).unwrap(), cmd);
    }

    #[test]
    fn history_read_skips_unknown_elements() {
        let json = r#"{
            "version": 1,
            "scenario_hash": 7,
            "full_turns": 2,
            "commands": [
                {"turn": 1, "faction": 0, "command": {"type": "BeginTurn"}},
                {"turn": 1, "faction": 0, "command": {"type": "LaunchZeppelin", "altitude": 900}},
                {"turn": 1, "faction": 0, "command": {"type": "EndTurn"}}
            ]
        }"#;

        let (file, skipped) = deserialize_history_json(json).unwrap();
        assert_eq!(file.commands.len(), 2);
        assert_eq!(skipped, vec![1]);
        assert_eq!(file.full_turns, 2);
        assert_eq!(file.commands[0].faction, FactionId(0));
    }

    #[test]
    fn fnv_hash_is_stable() {
        assert_eq!(hash_bytes_fnv1a64(b""), 0xcbf29ce484222325);
        assert_eq!(hash_bytes_fnv1a64(b"a"), 0xaf63dc4c8601ec8c);
    }
}
