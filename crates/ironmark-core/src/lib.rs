mod command;
mod entity;
mod error;
mod faction;
mod finder;
mod history;
mod instruction;
mod scenario;
mod script;
mod search;
mod site;
mod store;
mod variable;
mod world;

pub use crate::command::{CommandPhase, CommandQueue, CommandRun, Engine};
pub use crate::entity::Entity;
pub use crate::error::{EngineError, HistoryImportError, InvalidCommand, InvariantViolation};
pub use crate::faction::Faction;
pub use crate::finder::{Finder, UnitAgent};
pub use crate::history::{EntityHistory, FactionHistory, History};
pub use crate::instruction::{execute_instruction, InstructionOutcome};
pub use crate::scenario::*;
pub use crate::script::{
    default_check_depletion, default_validate_owner, default_validate_site, DefaultScript,
    PlayerSettings, RuleScript,
};
pub use crate::search::{
    best_path, flood_fill, line_of_sight, PathResult, Reachable, SearchSpace,
};
pub use crate::site::{Site, SiteGrid};
pub use crate::store::EntityStore;
pub use crate::variable::{
    Variable, VariableContainer, VariableHolder, VariablePurpose, VariableRole, MODIFIER_MAXIMUM,
    MODIFIER_MINIMUM,
};
pub use crate::world::WorldState;
