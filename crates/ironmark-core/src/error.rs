use thiserror::Error;

use ironmark_protocol::{Coord, EntityId, FactionId};

/// A command or instruction is inconsistent with the current world state.
///
/// The only error kind expected from untrusted input. Raised strictly before
/// any mutation, so a rejected command leaves the world untouched. Every
/// variant names the offending identifiers and the violated rule.
#[derive(Debug, Error)]
pub enum InvalidCommand {
    #[error("unknown entity {0:?}")]
    UnknownEntity(EntityId),
    #[error("unknown faction {0}")]
    UnknownFaction(FactionId),
    #[error("no site at {0}")]
    UnknownSite(Coord),
    #[error("game is already over")]
    GameOver,
    #[error("faction {faction} cannot act: it is not the active faction")]
    NotActiveFaction { faction: String },
    #[error("{name} does not belong to faction {faction}")]
    WrongOwner { name: String, faction: String },
    #[error("{name} is not placed on the map")]
    NotPlaced { name: String },
    #[error("{name} is not a unit")]
    NotAUnit { name: String },
    #[error("faction {faction} lacks {resource} to build {class}: need {need}, have {have}")]
    NotEnoughResources {
        faction: String,
        resource: String,
        class: String,
        need: i64,
        have: i64,
    },
    #[error("faction {faction} has no build capacity left for {class}")]
    NoBuildCapacity { faction: String, class: String },
    #[error("build limit reached for {class} in faction {faction}")]
    BuildLimitReached { faction: String, class: String },
    #[error("class {class} cannot be built")]
    NotBuildable { class: String },
    #[error("{name} cannot occupy {at}: {reason}")]
    IllegalSite {
        name: String,
        at: Coord,
        reason: String,
    },
    #[error("{name} cannot be owned by {owner}: {reason}")]
    IllegalOwner {
        name: String,
        owner: String,
        reason: String,
    },
    #[error("invalid movement path for {name}: {reason}")]
    InvalidPath { name: String, reason: String },
    #[error("{name} has {have} movement left, path costs {need}")]
    OutOfMovement { name: String, need: i64, have: i64 },
    #[error("{target} is out of attack range of {name}")]
    OutOfRange { name: String, target: String },
    #[error("no line of sight from {name} to {target}")]
    NoLineOfSight { name: String, target: String },
    #[error("{name} has no {resource} left to attack with")]
    OutOfAmmunition { name: String, resource: String },
    #[error("unknown variable {0:?}")]
    UnknownVariable(String),
    #[error("{name} already carries class {class}")]
    ClassUnchanged { name: String, class: String },
    #[error("cannot transform {name}: {from} and {to} are different kinds")]
    KindMismatch {
        name: String,
        from: String,
        to: String,
    },
    #[error("turn bracket commands cannot be queued")]
    TurnBracketQueued,
    #[error("{0}")]
    Rule(String),
}

/// Programmer or data error: a defect in the engine or a scripted extension.
/// Fatal to the operation; no partial-state recovery is attempted.
#[derive(Debug, Error)]
#[error("invariant violation: {reason}")]
pub struct InvariantViolation {
    pub reason: String,
}

impl InvariantViolation {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Command(#[from] InvalidCommand),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

impl EngineError {
    /// Whether the error is recoverable (a rejected command, not a defect).
    pub fn is_rejection(&self) -> bool {
        matches!(self, EngineError::Command(_))
    }
}

/// Errors raised while importing a persisted history log.
#[derive(Debug, Error)]
pub enum HistoryImportError {
    #[error("unsupported history version: {0}")]
    UnsupportedVersion(u32),
    #[error("scenario hash mismatch (expected {expected}, got {got})")]
    ScenarioHashMismatch { expected: u64, got: u64 },
    #[error("initial world rebuild failed: {0}")]
    Rebuild(#[source] EngineError),
    #[error("history command {index} failed to replay: {source}")]
    CommandFailed {
        index: usize,
        #[source]
        source: EngineError,
    },
}
