use std::collections::BTreeMap;

use ironmark_protocol::{
    Command, EntityEvent, EntityEventKind, EntityId, FactionEvent, FactionEventKind, FactionId,
    HistoryFile, RecordedCommand, HISTORY_FILE_VERSION,
};

use crate::error::InvariantViolation;

/// Per-entity event trail. Once the terminal `Deleted` event is recorded no
/// further events may be appended.
#[derive(Clone, Debug, Default)]
pub struct EntityHistory {
    /// Last known display name, kept current so stale references still
    /// resolve to something printable.
    pub name: String,
    pub events: Vec<EntityEvent>,
}

impl EntityHistory {
    pub fn is_deleted(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e.kind, EntityEventKind::Deleted))
    }

    pub fn add(&mut self, turn: u32, kind: EntityEventKind) -> Result<(), InvariantViolation> {
        if self.is_deleted() {
            return Err(InvariantViolation::new(format!(
                "entity history of {} is terminal, cannot append {kind:?}",
                self.name
            )));
        }
        if let EntityEventKind::Renamed { name } = &kind {
            self.name = name.clone();
        }
        self.events.push(EntityEvent { turn, kind });
        Ok(())
    }
}

/// Per-faction event trail; every event snapshots size and strength.
#[derive(Clone, Debug, Default)]
pub struct FactionHistory {
    pub name: String,
    pub events: Vec<FactionEvent>,
}

impl FactionHistory {
    pub fn is_deleted(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e.kind, FactionEventKind::Deleted))
    }

    pub fn add(
        &mut self,
        turn: u32,
        kind: FactionEventKind,
        size: u32,
        strength: i64,
    ) -> Result<(), InvariantViolation> {
        if self.is_deleted() {
            return Err(InvariantViolation::new(format!(
                "faction history of {} is terminal, cannot append {kind:?}",
                self.name
            )));
        }
        self.events.push(FactionEvent {
            turn,
            kind,
            size,
            strength,
        });
        Ok(())
    }
}

/// Append-only command log plus the per-object event trails. Replaying the
/// command list against a fresh world from the same scenario reproduces the
/// recorded game.
#[derive(Clone, Debug, Default)]
pub struct History {
    pub commands: Vec<RecordedCommand>,
    pub full_turns: u32,
    pub entities: BTreeMap<EntityId, EntityHistory>,
    pub factions: BTreeMap<FactionId, FactionHistory>,
}

impl History {
    /// Appends one command. The command's turn must equal `full_turns` or
    /// exceed it by exactly one; anything else is a programmer error.
    pub fn add_command(
        &mut self,
        faction: FactionId,
        command: Command,
        turn: u32,
    ) -> Result<(), InvariantViolation> {
        if turn == self.full_turns + 1 {
            self.full_turns = turn;
        } else if turn != self.full_turns {
            return Err(InvariantViolation::new(format!(
                "command turn {turn} does not follow full_turns {}",
                self.full_turns
            )));
        }
        self.commands.push(RecordedCommand {
            turn,
            faction,
            command,
        });
        Ok(())
    }

    /// Merges a possibly-longer log from a remote or alternate source.
    /// A history behind the current one (shorter, or fewer full turns) is an
    /// error; an already-subsumed history is a no-op. Returns whether anything
    /// was appended.
    pub fn add_commands(&mut self, other: &History) -> Result<bool, InvariantViolation> {
        if other.full_turns < self.full_turns || other.commands.len() < self.commands.len() {
            return Err(InvariantViolation::new(format!(
                "merged history is behind: {} turns / {} commands vs {} / {}",
                other.full_turns,
                other.commands.len(),
                self.full_turns,
                self.commands.len()
            )));
        }
        if other.full_turns == self.full_turns && other.commands.len() == self.commands.len() {
            return Ok(false);
        }
        for recorded in &other.commands[self.commands.len()..] {
            self.add_command(recorded.faction, recorded.command.clone(), recorded.turn)?;
        }
        Ok(true)
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntityHistory> {
        self.entities.get(&id)
    }

    pub fn faction(&self, id: FactionId) -> Option<&FactionHistory> {
        self.factions.get(&id)
    }

    pub fn record_entity(
        &mut self,
        id: EntityId,
        name: &str,
        turn: u32,
        kind: EntityEventKind,
    ) -> Result<(), InvariantViolation> {
        let entry = self.entities.entry(id).or_insert_with(|| EntityHistory {
            name: name.to_owned(),
            events: Vec::new(),
        });
        entry.add(turn, kind)
    }

    pub fn record_faction(
        &mut self,
        id: FactionId,
        name: &str,
        turn: u32,
        kind: FactionEventKind,
        size: u32,
        strength: i64,
    ) -> Result<(), InvariantViolation> {
        let entry = self.factions.entry(id).or_insert_with(|| FactionHistory {
            name: name.to_owned(),
            events: Vec::new(),
        });
        entry.add(turn, kind, size, strength)
    }

    pub fn to_file(&self, scenario_hash: u64) -> HistoryFile {
        HistoryFile {
            version: HISTORY_FILE_VERSION,
            scenario_hash,
            full_turns: self.full_turns,
            commands: self.commands.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with(turns: &[u32]) -> History {
        let mut history = History::default();
        for turn in turns {
            history
                .add_command(FactionId(0), Command::EndTurn, *turn)
                .unwrap();
        }
        history
    }

    #[test]
    fn full_turns_advances_only_by_exactly_one() {
        let mut history = History::default();
        history.add_command(FactionId(0), Command::BeginTurn, 1).unwrap();
        assert_eq!(history.full_turns, 1);
        history.add_command(FactionId(0), Command::EndTurn, 1).unwrap();
        assert_eq!(history.full_turns, 1);
        history.add_command(FactionId(0), Command::BeginTurn, 2).unwrap();
        assert_eq!(history.full_turns, 2);

        // Skipping a turn or going backwards is a programmer error.
        assert!(history.add_command(FactionId(0), Command::BeginTurn, 4).is_err());
        assert!(history.add_command(FactionId(0), Command::BeginTurn, 1).is_err());
    }

    #[test]
    fn merge_is_idempotent_on_subsumed_history() {
        let mut base = log_with(&[1, 2]);
        let same = log_with(&[1, 2]);
        assert!(!base.add_commands(&same).unwrap());
        assert_eq!(base.commands.len(), 2);

        let longer = log_with(&[1, 2, 3]);
        assert!(base.add_commands(&longer).unwrap());
        assert_eq!(base.commands.len(), 3);
        assert_eq!(base.full_turns, 3);
    }

    #[test]
    fn merge_rejects_history_behind_the_current_one() {
        let mut base = log_with(&[1, 2, 3]);
        let behind = log_with(&[1, 2]);
        assert!(base.add_commands(&behind).is_err());
    }

    #[test]
    fn terminal_delete_freezes_an_entity_trail() {
        let mut history = History::default();
        let id = EntityId::new(0, 0);
        history
            .record_entity(id, "Infantry 1", 1, EntityEventKind::Deleted)
            .unwrap();
        let err = history.record_entity(
            id,
            "Infantry 1",
            1,
            EntityEventKind::Renamed {
                name: "Ghost".into(),
            },
        );
        assert!(err.is_err());
    }
}
