use serde::{Deserialize, Serialize};

use ironmark_protocol::{
    Coord, EntityId, EntityKind, FactionClassId, FactionId, FactionSnapshot, VariableId,
};

use crate::scenario::{CompiledScenario, VariableCategory};
use crate::script::PlayerSettings;
use crate::variable::{VariableContainer, VariableHolder, VariablePurpose, VariableRole};

/// A competing side owning sites, entities and resources.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Faction {
    pub id: FactionId,
    pub class: FactionClassId,
    pub name: String,
    pub home: Option<Coord>,
    pub resigned: bool,
    /// Coordinates of owned sites, in claim order.
    pub sites: Vec<Coord>,
    pub units: Vec<EntityId>,
    pub terrains: Vec<EntityId>,
    pub upgrades: Vec<EntityId>,
    pub counters: VariableContainer,
    pub resources: VariableContainer,
    pub settings: PlayerSettings,
}

impl Faction {
    pub fn from_class(
        scenario: &CompiledScenario,
        id: FactionId,
        class_id: FactionClassId,
        settings: PlayerSettings,
    ) -> Self {
        let class = scenario.faction_class(class_id);
        let basic = VariablePurpose {
            role: VariableRole::Basic,
            holder: VariableHolder::Faction,
            scenario: true,
        };
        Self {
            id,
            class: class_id,
            name: class.name.clone(),
            home: class.home,
            resigned: false,
            sites: Vec::new(),
            units: Vec::new(),
            terrains: Vec::new(),
            upgrades: Vec::new(),
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
            settings,
        }
    }

    /// The owned-entity list for a kind. Effects are tracked through their
    /// site, not a faction collection.
    pub fn collection(&self, kind: EntityKind) -> Option<&Vec<EntityId>> {
        match kind {
            EntityKind::Unit => Some(&self.units),
            EntityKind::Terrain => Some(&self.terrains),
            EntityKind::Upgrade => Some(&self.upgrades),
            EntityKind::Effect => None,
        }
    }

    pub fn collection_mut(&mut self, kind: EntityKind) -> Option<&mut Vec<EntityId>> {
        match kind {
            EntityKind::Unit => Some(&mut self.units),
            EntityKind::Terrain => Some(&mut self.terrains),
            EntityKind::Upgrade => Some(&mut self.upgrades),
            EntityKind::Effect => None,
        }
    }

    /// Owned sites plus owned entities; snapshotted into faction history events.
    pub fn size(&self) -> u32 {
        (self.sites.len() + self.units.len() + self.terrains.len() + self.upgrades.len()) as u32
    }

    pub fn resource(&self, id: VariableId) -> i64 {
        self.resources.value(id).unwrap_or(0)
    }

    pub fn counter(&self, id: VariableId) -> i64 {
        self.counters.value(id).unwrap_or(0)
    }

    /// A faction with no units left is out of the game; sites alone do not
    /// sustain it.
    pub fn is_eliminated(&self) -> bool {
        self.units.is_empty()
    }

    pub fn snapshot(&self) -> FactionSnapshot {
        FactionSnapshot {
            id: self.id,
            class: self.class,
            name: self.name.clone(),
            resigned: self.resigned,
            home: self.home,
            sites: self.sites.clone(),
            units: self.units.clone(),
            terrains: self.terrains.clone(),
            upgrades: self.upgrades.clone(),
            counters: self.counters.snapshot_values(),
            resources: self.resources.snapshot_values(),
        }
    }
}
