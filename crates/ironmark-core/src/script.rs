use serde::{Deserialize, Serialize};

use ironmark_protocol::{Coord, EntityClassId, EntityId, EntityKind, FactionClassId, FactionId};

use crate::entity::Entity;
use crate::error::{EngineError, InvalidCommand};
use crate::faction::Faction;
use crate::scenario::CompiledScenario;
use crate::world::WorldState;

/// Read-only per-faction control settings, queried by rule scripts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSettings {
    pub is_computer: bool,
    pub use_scripting: bool,
}

impl PlayerSettings {
    /// `use_scripting` is forced off whenever the faction is not
    /// computer-controlled.
    pub fn new(is_computer: bool, use_scripting: bool) -> Self {
        Self {
            is_computer,
            use_scripting: use_scripting && is_computer,
        }
    }

    pub fn human() -> Self {
        Self::new(false, false)
    }

    pub fn computer(use_scripting: bool) -> Self {
        Self::new(true, use_scripting)
    }
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self::human()
    }
}

/// Capability set for scenario-specific rule overrides.
///
/// The engine depends only on this contract and never inspects which
/// implementation is active: the built-in [`DefaultScript`] and a
/// scenario-supplied override are interchangeable. `initialize` is called
/// exactly once, after the first full world is built and before any command
/// executes.
pub trait RuleScript: Send + Sync {
    fn create_entity(
        &self,
        scenario: &CompiledScenario,
        id: EntityId,
        class: EntityClassId,
        owner: Option<FactionId>,
        name: String,
    ) -> Entity {
        Entity::from_class(scenario, id, class, owner, name)
    }

    fn create_faction(
        &self,
        scenario: &CompiledScenario,
        id: FactionId,
        class: FactionClassId,
        settings: PlayerSettings,
    ) -> Faction {
        Faction::from_class(scenario, id, class, settings)
    }

    fn initialize(&self, world: &mut WorldState) -> Result<(), EngineError> {
        let _ = world;
        Ok(())
    }

    /// Invoked before an entity's owner changes. Succeeds silently or rejects
    /// with a named reason.
    fn validate_owner(
        &self,
        world: &WorldState,
        entity: &Entity,
        owner: Option<FactionId>,
    ) -> Result<(), InvalidCommand> {
        default_validate_owner(world, entity, owner)
    }

    /// Invoked before an entity's site changes (`None` = into inventory).
    fn validate_site(
        &self,
        world: &WorldState,
        entity: &Entity,
        site: Option<Coord>,
    ) -> Result<(), InvalidCommand> {
        default_validate_site(world, entity, site)
    }

    /// Invoked after any resource value change; returning true removes the
    /// entity from the world.
    fn check_depletion(&self, world: &WorldState, entity: &Entity) -> bool {
        default_check_depletion(world, entity)
    }
}

/// The engine's built-in rule behavior.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultScript;

impl RuleScript for DefaultScript {}

pub fn default_validate_owner(
    world: &WorldState,
    entity: &Entity,
    owner: Option<FactionId>,
) -> Result<(), InvalidCommand> {
    let owner_name = |faction: Option<FactionId>| {
        faction
            .and_then(|id| world.faction(id))
            .map(|f| f.name.clone())
            .unwrap_or_else(|| "nobody".to_owned())
    };

    match entity.kind {
        EntityKind::Unit | EntityKind::Upgrade => {
            if owner.is_none() {
                return Err(InvalidCommand::IllegalOwner {
                    name: entity.name.clone(),
                    owner: owner_name(owner),
                    reason: "units and upgrades must belong to a faction".into(),
                });
            }
        }
        EntityKind::Terrain | EntityKind::Effect => {
            // While placed, terrains and effects share their site's owner.
            if let Some(at) = entity.site {
                let site_owner = world.site(at).and_then(|s| s.owner);
                if site_owner.is_some() && owner != site_owner {
                    return Err(InvalidCommand::IllegalOwner {
                        name: entity.name.clone(),
                        owner: owner_name(owner),
                        reason: format!(
                            "placed {:?} entities share their site's owner",
                            entity.kind
                        ),
                    });
                }
            }
        }
    }
    Ok(())
}

pub fn default_validate_site(
    world: &WorldState,
    entity: &Entity,
    site: Option<Coord>,
) -> Result<(), InvalidCommand> {
    let Some(at) = site else {
        if entity.kind == EntityKind::Effect {
            return Err(InvalidCommand::IllegalSite {
                name: entity.name.clone(),
                at: entity.site.unwrap_or(Coord { x: -1, y: -1 }),
                reason: "effects must always be placed".into(),
            });
        }
        return Ok(());
    };

    let Some(target) = world.site(at) else {
        return Err(InvalidCommand::UnknownSite(at));
    };

    match entity.kind {
        EntityKind::Upgrade => Err(InvalidCommand::IllegalSite {
            name: entity.name.clone(),
            at,
            reason: "upgrades stay in their faction's inventory".into(),
        }),
        EntityKind::Unit => {
            let hostile = target.units.iter().any(|other| {
                world
                    .entity(*other)
                    .is_some_and(|u| u.owner != entity.owner)
            });
            if hostile {
                return Err(InvalidCommand::IllegalSite {
                    name: entity.name.clone(),
                    at,
                    reason: "site is occupied by another faction's units".into(),
                });
            }
            Ok(())
        }
        EntityKind::Terrain | EntityKind::Effect => {
            if target.owner.is_some() && entity.owner.is_some() && target.owner != entity.owner {
                return Err(InvalidCommand::IllegalSite {
                    name: entity.name.clone(),
                    at,
                    reason: "site belongs to another faction".into(),
                });
            }
            Ok(())
        }
    }
}

pub fn default_check_depletion(world: &WorldState, entity: &Entity) -> bool {
    let scenario = world.scenario();
    let class = scenario.entity_class(entity.class);
    // Background terrains are the floor of a site; depletion never removes them.
    if class.background {
        return false;
    }
    class
        .decisive
        .iter()
        .any(|variable| entity.resource(*variable) <= 0)
}
