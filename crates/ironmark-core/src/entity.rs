use serde::{Deserialize, Serialize};

use ironmark_protocol::{
    Coord, EntityClassId, EntityId, EntityKind, EntitySnapshot, FactionId, VariableId,
};

use crate::scenario::{CompiledScenario, VariableCategory};
use crate::variable::{VariableContainer, VariableHolder, VariablePurpose, VariableRole};

/// A Unit, Terrain, Effect or Upgrade instance.
///
/// The id is unique and immutable for the life of the world (and its clones).
/// `site == None` means the entity sits in its owner's inventory. Owner/site
/// changes go through the world aggregate, which runs the rule-script
/// validation hooks first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub class: EntityClassId,
    pub kind: EntityKind,
    pub name: String,
    pub owner: Option<FactionId>,
    pub site: Option<Coord>,
    pub attributes: VariableContainer,
    pub counters: VariableContainer,
    pub resources: VariableContainer,
    /// Externally computed adjustments, keyed like the attributes they touch.
    pub modifiers: VariableContainer,
}

impl Entity {
    /// Builds an entity whose containers alias the class templates. The first
    /// mutation of any container allocates its private copy.
    pub fn from_class(
        scenario: &CompiledScenario,
        id: EntityId,
        class_id: EntityClassId,
        owner: Option<FactionId>,
        name: String,
    ) -> Self {
        let class = scenario.entity_class(class_id);
        let basic = VariablePurpose {
            role: VariableRole::Basic,
            holder: VariableHolder::Entity,
            scenario: true,
        };
        let modifier = VariablePurpose {
            role: VariableRole::Modifier,
            holder: VariableHolder::Entity,
            scenario: false,
        };
        Self {
            id,
            class: class_id,
            kind: class.kind,
            name,
            owner,
            site: None,
            attributes: VariableContainer::shared(
                VariableCategory::Attribute,
                basic,
                class.attribute_template.clone(),
            ),
            counters: VariableContainer::shared(
                VariableCategory::Resource,
                basic,
                class.counter_template.clone(),
            ),
            resources: VariableContainer::shared(
                VariableCategory::Resource,
                basic,
                class.resource_template.clone(),
            ),
            modifiers: VariableContainer::empty(VariableCategory::Attribute, modifier),
        }
    }

    /// Re-kits the entity for a new class: containers alias the new class
    /// templates again. Used by class-transform instructions.
    pub fn adopt_class(&mut self, scenario: &CompiledScenario, class_id: EntityClassId) {
        let keep_name = std::mem::take(&mut self.name);
        let replacement =
            Entity::from_class(scenario, self.id, class_id, self.owner, keep_name);
        let site = self.site;
        *self = replacement;
        self.site = site;
    }

    pub fn is_placed(&self) -> bool {
        self.site.is_some()
    }

    pub fn is_background(&self, scenario: &CompiledScenario) -> bool {
        scenario.entity_class(self.class).background
    }

    pub fn attribute(&self, id: VariableId) -> i64 {
        self.attributes.value(id).unwrap_or(0)
    }

    pub fn counter(&self, id: VariableId) -> i64 {
        self.counters.value(id).unwrap_or(0)
    }

    pub fn resource(&self, id: VariableId) -> i64 {
        self.resources.value(id).unwrap_or(0)
    }

    /// Contribution to the owning faction's strength snapshots.
    pub fn strength(&self, scenario: &CompiledScenario) -> i64 {
        if self.kind != EntityKind::Unit {
            return 0;
        }
        self.attribute(scenario.vars.attack)
            + self.attribute(scenario.vars.defense)
            + self.resource(scenario.vars.hits)
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.id,
            class: self.class,
            kind: self.kind,
            name: self.name.clone(),
            owner: self.owner,
            at: self.site,
            attributes: self.attributes.snapshot_values(),
            counters: self.counters.snapshot_values(),
            resources: self.resources.snapshot_values(),
        }
    }
}
