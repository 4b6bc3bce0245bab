use std::collections::HashMap;
use std::sync::Arc;

use ironmark_protocol::{Coord, DataId, EntityClassId, EntityKind, FactionClassId, VariableId};
use serde::{Deserialize, Serialize};

use crate::variable::{Variable, VariableHolder, VariablePurpose, VariableRole};

/// Category of a variable class: attributes derive from initial + modifiers,
/// resources are spent and replenished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableCategory {
    Attribute,
    Resource,
}

/// Immutable template for a variable. Owned by the scenario layer and shared
/// by every world snapshot.
#[derive(Clone, Debug)]
pub struct VariableClass {
    pub data_id: DataId,
    pub name: String,
    pub category: VariableCategory,
    pub minimum: i64,
    pub maximum: i64,
    /// Display scale (value units per shown point).
    pub scale: i64,
    /// A limited resource is additionally capped by its initial value.
    pub limited: bool,
}

/// Scope of a class-defined modifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierScope {
    /// Applies to units stacked on the carrier's site (terrains, effects).
    SiteUnits,
    /// Applies to every unit of the carrier's owner (upgrades).
    OwnerUnits,
}

#[derive(Clone, Debug)]
pub struct ModifierDef {
    pub variable: VariableId,
    pub delta: i64,
    pub scope: ModifierScope,
}

/// Compiled entity class. Initial variable values are kept both as lists and
/// as pre-built shared container storage so freshly created entities alias the
/// template until first mutation.
#[derive(Clone, Debug)]
pub struct EntityClass {
    pub data_id: DataId,
    pub name: String,
    pub kind: EntityKind,
    /// Single-instance classes keep their bare name; others get numbered names.
    pub unique: bool,
    /// Terrain only: occupies stack index 0 and cannot be depleted away.
    pub background: bool,
    /// Terrain only: sites carrying this block line of sight.
    pub blocks_attack: bool,
    /// Terrain only: cost for a unit to step onto the site.
    pub move_cost: i64,
    /// Unit only: attacking consumes this resource when present.
    pub ammunition: Option<VariableId>,
    /// Unit only: attacks at range require line of sight.
    pub needs_sight: bool,
    /// Resources a faction pays to build one instance.
    pub cost: Vec<(VariableId, i64)>,
    /// Maximum live instances per faction (0 = unlimited).
    pub build_limit: u32,
    pub attributes: Vec<(VariableId, i64)>,
    pub counters: Vec<(VariableId, i64)>,
    pub resources: Vec<(VariableId, i64)>,
    /// Resources whose depletion removes the entity from the world.
    pub decisive: Vec<VariableId>,
    pub modifiers: Vec<ModifierDef>,

    pub attribute_template: Arc<Vec<Variable>>,
    pub counter_template: Arc<Vec<Variable>>,
    pub resource_template: Arc<Vec<Variable>>,
}

impl EntityClass {
    pub fn initial_attribute(&self, id: VariableId) -> Option<i64> {
        self.attributes
            .iter()
            .find(|(v, _)| *v == id)
            .map(|(_, value)| *value)
    }
}

/// Compiled faction class.
#[derive(Clone, Debug)]
pub struct FactionClass {
    pub data_id: DataId,
    pub name: String,
    pub home: Option<Coord>,
    pub counters: Vec<(VariableId, i64)>,
    pub resources: Vec<(VariableId, i64)>,
    /// Build capacity granted at the start of each of the faction's turns.
    pub builds_per_turn: i64,

    pub counter_template: Arc<Vec<Variable>>,
    pub resource_template: Arc<Vec<Variable>>,
}

/// One rectangular region of scenario-placed entities.
#[derive(Clone, Debug)]
pub struct AreaDef {
    pub from: Coord,
    pub to: Coord,
    pub owner: Option<FactionClassId>,
    pub entities: Vec<EntityClassId>,
}

#[derive(Clone, Debug)]
pub struct MapDef {
    pub width: u32,
    pub height: u32,
    pub default_terrain: EntityClassId,
}

/// Variable ids the engine's built-in rules refer to. Resolved once at
/// scenario load from reserved data-ids.
#[derive(Clone, Copy, Debug)]
pub struct WellKnownVariables {
    pub movement: VariableId,
    pub attack: VariableId,
    pub defense: VariableId,
    pub attack_range: VariableId,
    pub sight: VariableId,
    pub hits: VariableId,
    pub moves_left: VariableId,
    pub builds: VariableId,
}

/// Fully compiled scenario: classes with dense runtime ids plus the data-id
/// lookup tables. An explicitly owned value passed into world construction;
/// snapshots share it behind `Arc`.
#[derive(Clone, Debug)]
pub struct CompiledScenario {
    pub name: String,
    pub variables: Vec<VariableClass>,
    pub entity_classes: Vec<EntityClass>,
    pub faction_classes: Vec<FactionClass>,

    pub variable_ids: HashMap<DataId, VariableId>,
    pub entity_class_ids: HashMap<DataId, EntityClassId>,
    pub faction_class_ids: HashMap<DataId, FactionClassId>,

    pub map: MapDef,
    pub areas: Vec<AreaDef>,
    pub vars: WellKnownVariables,

    /// FNV-1a digest of the raw scenario text; persisted logs carry it so a
    /// replay against different rules is rejected up front.
    pub digest: u64,
}

impl CompiledScenario {
    pub fn variable(&self, id: VariableId) -> &VariableClass {
        &self.variables[id.raw as usize]
    }

    pub fn entity_class(&self, id: EntityClassId) -> &EntityClass {
        &self.entity_classes[id.raw as usize]
    }

    pub fn faction_class(&self, id: FactionClassId) -> &FactionClass {
        &self.faction_classes[id.raw as usize]
    }

    pub fn variable_id(&self, data_id: &str) -> Option<VariableId> {
        self.variable_ids.get(data_id).copied()
    }

    pub fn entity_class_id(&self, data_id: &str) -> Option<EntityClassId> {
        self.entity_class_ids.get(data_id).copied()
    }

    pub fn faction_class_id(&self, data_id: &str) -> Option<FactionClassId> {
        self.faction_class_ids.get(data_id).copied()
    }
}

pub(crate) fn build_template(
    scenario_variables: &[VariableClass],
    values: &[(VariableId, i64)],
    holder: VariableHolder,
) -> Arc<Vec<Variable>> {
    let purpose = VariablePurpose {
        role: VariableRole::Basic,
        holder,
        scenario: true,
    };
    Arc::new(
        values
            .iter()
            .map(|(id, value)| {
                Variable::new(&scenario_variables[id.raw as usize], *id, purpose, *value)
            })
            .collect(),
    )
}
