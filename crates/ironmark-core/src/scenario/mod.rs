mod loader;
mod types;

pub use loader::{load_scenario, ScenarioError, ScenarioSource};
pub use types::*;
