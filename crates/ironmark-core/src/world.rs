use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use ironmark_protocol::{
    Coord, EntityClassId, EntityEventKind, EntityId, EntityKind, EntityRef, FactionEventKind,
    FactionId, FactionRef, SiteRef, VariableId, VariableTarget, WorldSnapshot,
};

use crate::entity::Entity;
use crate::error::{EngineError, InvalidCommand, InvariantViolation};
use crate::faction::Faction;
use crate::history::History;
use crate::scenario::{CompiledScenario, ModifierScope, VariableCategory};
use crate::script::{PlayerSettings, RuleScript};
use crate::site::{Site, SiteGrid};
use crate::store::EntityStore;

/// The complete, clonable snapshot of the game world and the only component
/// permitted to mutate it.
///
/// Scenario definitions and the rule script are immutable and shared between
/// clones; everything else is deeply copied by [`WorldState::clone_state`].
#[derive(Clone)]
pub struct WorldState {
    scenario: Arc<CompiledScenario>,
    script: Arc<dyn RuleScript>,
    pub grid: SiteGrid,
    /// Surviving factions, in turn order.
    pub factions: Vec<Faction>,
    pub entities: EntityStore,
    /// Per-class instantiation counters, for disambiguating unit names.
    pub class_counts: Vec<u32>,
    pub turn: u32,
    pub active_faction: usize,
    pub game_over: bool,
    pub winner: Option<FactionId>,
    pub history: History,
    needs_valuation: bool,
}

impl WorldState {
    /// Builds the initial world from scenario data via the rule-script
    /// factories, then hands it to the script's one-time `initialize` hook.
    pub fn initialize(
        scenario: Arc<CompiledScenario>,
        script: Arc<dyn RuleScript>,
        settings: &[PlayerSettings],
    ) -> Result<Self, EngineError> {
        let mut world = Self {
            grid: SiteGrid::new(scenario.map.width, scenario.map.height),
            factions: Vec::new(),
            entities: EntityStore::default(),
            class_counts: vec![0; scenario.entity_classes.len()],
            turn: 0,
            active_faction: 0,
            game_over: false,
            winner: None,
            history: History::default(),
            needs_valuation: true,
            scenario,
            script,
        };

        for index in 0..world.scenario.faction_classes.len() {
            let id = FactionId(index as u8);
            let class_id = ironmark_protocol::FactionClassId::new(index as u16);
            let faction_settings = settings.get(index).copied().unwrap_or_default();
            let faction =
                world
                    .script
                    .create_faction(&world.scenario, id, class_id, faction_settings);
            world.history.record_faction(
                id,
                &faction.name,
                world.turn,
                FactionEventKind::Created,
                faction.size(),
                0,
            )?;
            world.factions.push(faction);
        }

        // Default background terrain everywhere.
        let default_terrain = world.scenario.map.default_terrain;
        for y in 0..world.grid.height() as i32 {
            for x in 0..world.grid.width() as i32 {
                let at = Coord { x, y };
                let id = world.create_entity(default_terrain, None, None)?;
                world.place_entity(id, Some(at))?;
            }
        }

        // Area-defined entities, region by region.
        let areas = world.scenario.areas.clone();
        for area in &areas {
            let owner = area.owner.and_then(|class| {
                world
                    .factions
                    .iter()
                    .find(|f| f.class == class)
                    .map(|f| f.id)
            });
            for y in area.from.y.min(area.to.y)..=area.from.y.max(area.to.y) {
                for x in area.from.x.min(area.to.x)..=area.from.x.max(area.to.x) {
                    let at = Coord { x, y };
                    if owner.is_some() {
                        world.claim_site(at, owner)?;
                    }
                    for class_id in &area.entities {
                        world.populate_site(at, *class_id, owner)?;
                    }
                }
            }
        }

        world.refresh_valuation();
        world.refresh_modifiers();

        let script = world.script.clone();
        script.initialize(&mut world)?;
        world.turn = 1;
        Ok(world)
    }

    /// A fully independent deep copy. Scenario data and the rule script are
    /// shared (both immutable); no mutable state is reachable from both the
    /// copy and the original.
    pub fn clone_state(&self) -> Self {
        self.clone()
    }

    pub fn scenario(&self) -> &CompiledScenario {
        &self.scenario
    }

    pub fn scenario_arc(&self) -> Arc<CompiledScenario> {
        self.scenario.clone()
    }

    pub fn script(&self) -> Arc<dyn RuleScript> {
        self.script.clone()
    }

    pub fn faction(&self, id: FactionId) -> Option<&Faction> {
        self.factions.iter().find(|f| f.id == id)
    }

    pub fn faction_mut(&mut self, id: FactionId) -> Option<&mut Faction> {
        self.factions.iter_mut().find(|f| f.id == id)
    }

    pub fn active_faction_id(&self) -> Option<FactionId> {
        self.factions.get(self.active_faction).map(|f| f.id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub(crate) fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn site(&self, at: Coord) -> Option<&Site> {
        self.grid.get(at)
    }

    // ------------------------------------------------------------------
    // Cross-snapshot references
    // ------------------------------------------------------------------

    /// Captures a weak reference with the entity's current display name.
    pub fn entity_ref(&self, id: EntityId) -> Option<EntityRef> {
        self.entity(id).map(|e| EntityRef {
            id,
            name: e.name.clone(),
        })
    }

    pub fn faction_ref(&self, id: FactionId) -> Option<FactionRef> {
        self.faction(id).map(|f| FactionRef {
            id,
            name: f.name.clone(),
        })
    }

    pub fn site_ref(&self, at: Coord) -> Option<SiteRef> {
        self.grid.contains(at).then_some(SiteRef { at })
    }

    /// O(1) lookup; `None` once the referent is gone from this snapshot.
    pub fn resolve_entity(&self, reference: &EntityRef) -> Option<&Entity> {
        self.entity(reference.id)
    }

    pub fn resolve_faction(&self, reference: &FactionRef) -> Option<&Faction> {
        self.faction(reference.id)
    }

    pub fn resolve_site(&self, reference: &SiteRef) -> Option<&Site> {
        self.site(reference.at)
    }

    // ------------------------------------------------------------------
    // Entity graph mutation (command pipeline + initialization only)
    // ------------------------------------------------------------------

    /// Creates an entity of `class` through the rule-script factory, attaches
    /// it to its owner and records the Created event. Units of multi-instance
    /// classes get disambiguating numbered names.
    pub(crate) fn create_entity(
        &mut self,
        class_id: EntityClassId,
        owner: Option<FactionId>,
        explicit_name: Option<String>,
    ) -> Result<EntityId, EngineError> {
        let class = self
            .scenario
            .entity_classes
            .get(class_id.raw as usize)
            .ok_or_else(|| InvariantViolation::new(format!("no entity class {}", class_id.raw)))?
            .clone();

        if let Some(faction) = owner {
            if self.faction(faction).is_none() {
                return Err(InvalidCommand::UnknownFaction(faction).into());
            }
        }

        self.class_counts[class_id.raw as usize] += 1;
        let count = self.class_counts[class_id.raw as usize];
        let name = explicit_name.unwrap_or_else(|| {
            if class.kind == EntityKind::Unit && !class.unique {
                format!("{} {}", class.name, count)
            } else {
                class.name.clone()
            }
        });

        let scenario = self.scenario.clone();
        let script = self.script.clone();
        let id = self
            .entities
            .allocate(|id| script.create_entity(&scenario, id, class_id, owner, name));

        if let Some(entity) = self.entity(id) {
            let entity_owner = entity.owner;
            if let Err(rejection) = self.script.validate_owner(self, entity, entity_owner) {
                self.entities.remove(id);
                return Err(rejection.into());
            }
        }

        if let Some(faction_id) = owner {
            let kind = class.kind;
            if let Some(faction) = self.faction_mut(faction_id) {
                if let Some(collection) = faction.collection_mut(kind) {
                    collection.push(id);
                }
            }
        }

        let turn = self.turn;
        let entity_name = self.entity(id).map(|e| e.name.clone()).unwrap_or_default();
        self.history.record_entity(
            id,
            &entity_name,
            turn,
            EntityEventKind::Created { class: class_id },
        )?;
        debug!(entity = id.to_raw(), class = %class.data_id, "entity created");
        Ok(id)
    }

    /// Detaches the entity from the live graph and frees its slot. The
    /// terminal Deleted event keeps its identity in the history; stale
    /// references resolve to `None` afterwards.
    pub(crate) fn delete_entity(&mut self, id: EntityId) -> Result<bool, EngineError> {
        let Some(entity) = self.entity(id) else {
            return Ok(false);
        };
        let kind = entity.kind;
        let site = entity.site;
        let owner = entity.owner;
        let name = entity.name.clone();

        if let Some(at) = site {
            if let Some(site) = self.grid.get_mut(at) {
                if let Some(stack) = site.stack_mut(kind) {
                    stack.retain(|e| *e != id);
                }
                if kind == EntityKind::Terrain {
                    site.mark_dirty();
                    self.needs_valuation = true;
                }
            }
        }
        if let Some(faction_id) = owner {
            if let Some(faction) = self.faction_mut(faction_id) {
                if let Some(collection) = faction.collection_mut(kind) {
                    collection.retain(|e| *e != id);
                }
            }
        }

        let turn = self.turn;
        self.history
            .record_entity(id, &name, turn, EntityEventKind::Deleted)?;
        self.entities.remove(id);
        debug!(entity = id.to_raw(), %name, "entity deleted");
        Ok(true)
    }

    /// Moves the entity between sites (or into inventory with `None`),
    /// running the site validation hook first. Background terrains enter the
    /// stack at index 0.
    pub(crate) fn place_entity(
        &mut self,
        id: EntityId,
        at: Option<Coord>,
    ) -> Result<bool, EngineError> {
        let Some(entity) = self.entity(id) else {
            return Err(InvalidCommand::UnknownEntity(id).into());
        };
        if entity.site == at {
            return Ok(false);
        }
        self.script.validate_site(self, entity, at)?;

        let kind = entity.kind;
        let previous = entity.site;
        let background = entity.is_background(&self.scenario);

        if let Some(old) = previous {
            if let Some(site) = self.grid.get_mut(old) {
                if let Some(stack) = site.stack_mut(kind) {
                    stack.retain(|e| *e != id);
                }
                if kind == EntityKind::Terrain {
                    site.mark_dirty();
                }
            }
        }
        if let Some(new) = at {
            if let Some(site) = self.grid.get_mut(new) {
                if let Some(stack) = site.stack_mut(kind) {
                    if background {
                        stack.insert(0, id);
                    } else {
                        stack.push(id);
                    }
                }
                if kind == EntityKind::Terrain {
                    site.mark_dirty();
                }
            }
        }
        if kind == EntityKind::Terrain {
            self.needs_valuation = true;
        }

        if let Some(entity) = self.entity_mut(id) {
            entity.site = at;
        }
        Ok(true)
    }

    pub(crate) fn set_owner(
        &mut self,
        id: EntityId,
        owner: Option<FactionId>,
    ) -> Result<bool, EngineError> {
        let Some(entity) = self.entity(id) else {
            return Err(InvalidCommand::UnknownEntity(id).into());
        };
        if entity.owner == owner {
            return Ok(false);
        }
        self.script.validate_owner(self, entity, owner)?;

        let kind = entity.kind;
        let previous = entity.owner;
        if let Some(old) = previous {
            if let Some(faction) = self.faction_mut(old) {
                if let Some(collection) = faction.collection_mut(kind) {
                    collection.retain(|e| *e != id);
                }
            }
        }
        if let Some(new) = owner {
            if let Some(faction) = self.faction_mut(new) {
                if let Some(collection) = faction.collection_mut(kind) {
                    collection.push(id);
                }
            }
        }
        if let Some(entity) = self.entity_mut(id) {
            entity.owner = owner;
        }
        Ok(true)
    }

    pub(crate) fn set_entity_name(
        &mut self,
        id: EntityId,
        name: String,
    ) -> Result<bool, EngineError> {
        let Some(entity) = self.entity(id) else {
            return Err(InvalidCommand::UnknownEntity(id).into());
        };
        if entity.name == name {
            return Ok(false);
        }
        let turn = self.turn;
        self.history
            .record_entity(id, &name, turn, EntityEventKind::Renamed { name: name.clone() })?;
        if let Some(entity) = self.entity_mut(id) {
            entity.name = name;
        }
        Ok(true)
    }

    pub(crate) fn set_entity_class(
        &mut self,
        id: EntityId,
        class_id: EntityClassId,
    ) -> Result<bool, EngineError> {
        if self.scenario.entity_classes.get(class_id.raw as usize).is_none() {
            return Err(
                InvariantViolation::new(format!("no entity class {}", class_id.raw)).into(),
            );
        }
        let Some(entity) = self.entity(id) else {
            return Err(InvalidCommand::UnknownEntity(id).into());
        };
        if entity.class == class_id {
            return Ok(false);
        }
        let name = entity.name.clone();
        let kind = entity.kind;
        let turn = self.turn;
        self.history.record_entity(
            id,
            &name,
            turn,
            EntityEventKind::ClassChanged { class: class_id },
        )?;

        let scenario = self.scenario.clone();
        if let Some(entity) = self.entity_mut(id) {
            entity.adopt_class(&scenario, class_id);
        }
        if kind == EntityKind::Terrain {
            if let Some(at) = self.entity(id).and_then(|e| e.site) {
                if let Some(site) = self.grid.get_mut(at) {
                    site.mark_dirty();
                }
            }
            self.needs_valuation = true;
        }
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    /// Routes a write to the matching container of the target. After entity
    /// resource writes the caller is expected to run [`Self::apply_depletion`].
    pub(crate) fn set_variable(
        &mut self,
        target: VariableTarget,
        variable: VariableId,
        value: i64,
        initial: bool,
    ) -> Result<bool, EngineError> {
        let scenario = self.scenario.clone();
        let class = scenario
            .variables
            .get(variable.raw as usize)
            .ok_or_else(|| InvariantViolation::new(format!("no variable class {}", variable.raw)))?;

        let changed = match target {
            VariableTarget::Entity { entity } => {
                let Some(e) = self.entity_mut(entity) else {
                    return Err(InvalidCommand::UnknownEntity(entity).into());
                };
                match class.category {
                    VariableCategory::Attribute => {
                        e.attributes.set_value(&scenario, variable, value, initial)?
                    }
                    VariableCategory::Resource => {
                        // Counters and resources share the category; route to
                        // whichever container already tracks the variable.
                        if e.counters.get(variable).is_some() {
                            e.counters.set_value(&scenario, variable, value, initial)?
                        } else {
                            e.resources.set_value(&scenario, variable, value, initial)?
                        }
                    }
                }
            }
            VariableTarget::Faction { faction } => {
                let Some(f) = self.faction_mut(faction) else {
                    return Err(InvalidCommand::UnknownFaction(faction).into());
                };
                if f.counters.get(variable).is_some() {
                    f.counters.set_value(&scenario, variable, value, initial)?
                } else {
                    f.resources.set_value(&scenario, variable, value, initial)?
                }
            }
        };
        Ok(changed)
    }

    pub(crate) fn variable_value(
        &self,
        target: VariableTarget,
        variable: VariableId,
    ) -> Result<i64, EngineError> {
        match target {
            VariableTarget::Entity { entity } => {
                let Some(e) = self.entity(entity) else {
                    return Err(InvalidCommand::UnknownEntity(entity).into());
                };
                Ok(e.attributes
                    .value(variable)
                    .or_else(|| e.counters.value(variable))
                    .or_else(|| e.resources.value(variable))
                    .unwrap_or(0))
            }
            VariableTarget::Faction { faction } => {
                let Some(f) = self.faction(faction) else {
                    return Err(InvalidCommand::UnknownFaction(faction).into());
                };
                Ok(f.counters
                    .value(variable)
                    .or_else(|| f.resources.value(variable))
                    .unwrap_or(0))
            }
        }
    }

    /// Removes the entity if its decisive resources ran out. Returns whether
    /// it was removed.
    pub(crate) fn apply_depletion(&mut self, id: EntityId) -> Result<bool, EngineError> {
        let Some(entity) = self.entity(id) else {
            return Ok(false);
        };
        if !self.script.check_depletion(self, entity) {
            return Ok(false);
        }
        self.delete_entity(id)
    }

    /// Recomputes every unit's modifier map from the terrains/effects on its
    /// site and its owner's upgrades, then imports the derived attribute
    /// values (initial + modifier) into the attribute containers.
    pub fn refresh_modifiers(&mut self) {
        let scenario = self.scenario.clone();
        let mut sums: BTreeMap<EntityId, BTreeMap<VariableId, i64>> = BTreeMap::new();

        for (_, carrier) in self.entities.iter() {
            let class = scenario.entity_class(carrier.class);
            if class.modifiers.is_empty() {
                continue;
            }
            for def in &class.modifiers {
                match def.scope {
                    ModifierScope::SiteUnits => {
                        let Some(at) = carrier.site else { continue };
                        let Some(site) = self.grid.get(at) else { continue };
                        for unit in &site.units {
                            *sums
                                .entry(*unit)
                                .or_default()
                                .entry(def.variable)
                                .or_default() += def.delta;
                        }
                    }
                    ModifierScope::OwnerUnits => {
                        let Some(owner) = carrier.owner else { continue };
                        let Some(faction) = self.faction(owner) else { continue };
                        for unit in &faction.units {
                            *sums
                                .entry(*unit)
                                .or_default()
                                .entry(def.variable)
                                .or_default() += def.delta;
                        }
                    }
                }
            }
        }

        let unit_ids: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|(_, e)| e.kind == EntityKind::Unit)
            .map(|(id, _)| id)
            .collect();

        for id in unit_ids {
            let mods = sums.remove(&id).unwrap_or_default();
            let Some(unit) = self.entities.get_mut(id) else {
                continue;
            };

            // Derived attribute values: initial + modifier sum, clamped.
            let derived: BTreeMap<VariableId, i64> = unit
                .attributes
                .iter()
                .map(|var| {
                    let delta = mods.get(&var.class).copied().unwrap_or(0);
                    (var.class, var.initial + delta)
                })
                .collect();

            // Keep the modifier map itself current, zeroing stale entries.
            let stale: Vec<VariableId> = unit
                .modifiers
                .iter()
                .filter(|var| !mods.contains_key(&var.class))
                .map(|var| var.class)
                .collect();
            for (variable, delta) in &mods {
                let _ = unit.modifiers.set_value(&scenario, *variable, *delta, false);
            }
            for variable in stale {
                let _ = unit.modifiers.set_value(&scenario, variable, 0, false);
            }

            unit.attributes.import_changes(&scenario, &derived);
        }
    }

    /// Recomputes move cost and attack blocking for sites whose terrain
    /// changed since the last pass.
    pub fn refresh_valuation(&mut self) {
        if !self.needs_valuation {
            return;
        }
        let scenario = self.scenario.clone();
        let width = self.grid.width() as i32;
        let height = self.grid.height() as i32;
        for y in 0..height {
            for x in 0..width {
                let at = Coord { x, y };
                let stack = match self.grid.get(at) {
                    Some(site) if site.is_dirty() => site.terrains.clone(),
                    _ => continue,
                };

                // The best (lowest) terrain cost wins, so a road-like overlay
                // can undercut its background.
                let mut move_cost: Option<i64> = None;
                let mut blocks_attack = false;
                for terrain in &stack {
                    let Some(entity) = self.entities.get(*terrain) else {
                        continue;
                    };
                    let class = scenario.entity_class(entity.class);
                    blocks_attack |= class.blocks_attack;
                    move_cost = Some(move_cost.map_or(class.move_cost, |c: i64| c.min(class.move_cost)));
                }

                if let Some(site) = self.grid.get_mut(at) {
                    site.set_valuation(move_cost.unwrap_or(1), blocks_attack);
                }
            }
        }
        self.needs_valuation = false;
    }

    pub fn valuation_pending(&self) -> bool {
        self.needs_valuation
    }

    // ------------------------------------------------------------------
    // Factions and turn rotation
    // ------------------------------------------------------------------

    /// Moves the active index to the next surviving faction, wrapping to 0
    /// and bumping the turn counter when the last faction finishes. Returns
    /// whether this transition began a new turn; eliminated factions can make
    /// index 0 recur mid-turn, so callers must use this instead of comparing
    /// indices.
    pub fn advance_faction(&mut self) -> Result<bool, InvariantViolation> {
        if self.factions.is_empty() {
            return Err(InvariantViolation::new(
                "cannot advance the turn of a world without factions",
            ));
        }
        self.active_faction += 1;
        if self.active_faction >= self.factions.len() {
            self.active_faction = 0;
            self.turn += 1;
            return Ok(true);
        }
        Ok(false)
    }

    /// Removes a faction out of turn order, deleting its entities and keeping
    /// `active_faction` in bounds.
    pub(crate) fn delete_faction(&mut self, id: FactionId) -> Result<(), EngineError> {
        let Some(index) = self.factions.iter().position(|f| f.id == id) else {
            return Err(InvalidCommand::UnknownFaction(id).into());
        };

        let turn = self.turn;
        let name = self.factions[index].name.clone();
        let size = self.factions[index].size();
        let strength = self.faction_strength(id);
        self.history
            .record_faction(id, &name, turn, FactionEventKind::Deleted, size, strength)?;

        let faction = &self.factions[index];
        let mut doomed: Vec<EntityId> = Vec::new();
        doomed.extend(&faction.units);
        doomed.extend(&faction.terrains);
        doomed.extend(&faction.upgrades);
        doomed.extend(
            self.entities
                .iter()
                .filter(|(_, e)| e.kind == EntityKind::Effect && e.owner == Some(id))
                .map(|(entity_id, _)| entity_id),
        );
        let sites = faction.sites.clone();

        for entity in doomed {
            self.delete_entity(entity)?;
        }
        for at in sites {
            if let Some(site) = self.grid.get_mut(at) {
                site.owner = None;
            }
        }

        self.factions.remove(index);
        if index < self.active_faction {
            self.active_faction -= 1;
        }
        if self.active_faction >= self.factions.len() {
            self.active_faction = 0;
        }
        Ok(())
    }

    /// Assigns site ownership, keeping the factions' site lists in sync.
    pub(crate) fn claim_site(
        &mut self,
        at: Coord,
        owner: Option<FactionId>,
    ) -> Result<(), EngineError> {
        let Some(site) = self.grid.get(at) else {
            return Err(InvalidCommand::UnknownSite(at).into());
        };
        let previous = site.owner;
        if previous == owner {
            return Ok(());
        }
        if let Some(old) = previous {
            if let Some(faction) = self.faction_mut(old) {
                faction.sites.retain(|c| *c != at);
            }
        }
        if let Some(new) = owner {
            if let Some(faction) = self.faction_mut(new) {
                faction.sites.push(at);
            }
        }
        if let Some(site) = self.grid.get_mut(at) {
            site.owner = owner;
        }
        Ok(())
    }

    /// Summed unit strength, snapshotted into faction history events.
    pub fn faction_strength(&self, id: FactionId) -> i64 {
        let Some(faction) = self.faction(id) else {
            return 0;
        };
        faction
            .units
            .iter()
            .filter_map(|unit| self.entity(*unit))
            .map(|unit| unit.strength(&self.scenario))
            .sum()
    }

    // ------------------------------------------------------------------
    // Initialization helpers
    // ------------------------------------------------------------------

    /// Places one area-defined entity. A new background terrain replaces the
    /// site's whole terrain stack, keeping the single-background invariant.
    fn populate_site(
        &mut self,
        at: Coord,
        class_id: EntityClassId,
        owner: Option<FactionId>,
    ) -> Result<(), EngineError> {
        let class = self
            .scenario
            .entity_classes
            .get(class_id.raw as usize)
            .ok_or_else(|| InvariantViolation::new(format!("no entity class {}", class_id.raw)))?;
        let kind = class.kind;
        let background = class.background;

        if background {
            let stack = self
                .grid
                .get(at)
                .map(|site| site.terrains.clone())
                .unwrap_or_default();
            for terrain in stack {
                self.delete_entity(terrain)?;
            }
        }

        let entity_owner = match kind {
            EntityKind::Unit | EntityKind::Upgrade => owner,
            EntityKind::Terrain | EntityKind::Effect => {
                owner.or_else(|| self.site(at).and_then(|s| s.owner))
            }
        };
        let id = self.create_entity(class_id, entity_owner, None)?;
        if kind != EntityKind::Upgrade {
            self.place_entity(id, Some(at))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            turn: self.turn,
            active_faction: self.active_faction_id(),
            game_over: self.game_over,
            winner: self.winner,
            full_turns: self.history.full_turns,
            grid: self.grid.snapshot(),
            factions: self.factions.iter().map(Faction::snapshot).collect(),
            entities: self.entities.iter().map(|(_, e)| e.snapshot()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{load_scenario, ScenarioSource};
    use crate::script::DefaultScript;

    fn base_world() -> WorldState {
        let scenario = Arc::new(load_scenario(ScenarioSource::Embedded).unwrap());
        WorldState::initialize(scenario, Arc::new(DefaultScript), &[]).unwrap()
    }

    #[test]
    fn every_site_has_exactly_one_background_terrain_at_index_zero() {
        let world = base_world();
        for site in world.grid.iter() {
            assert!(site.is_populated(), "site {} has no terrain", site.at);
            let backgrounds = site
                .terrains
                .iter()
                .filter(|id| {
                    world
                        .entity(**id)
                        .is_some_and(|e| e.is_background(world.scenario()))
                })
                .count();
            assert_eq!(backgrounds, 1, "site {} background count", site.at);
            let first = world.entity(site.terrains[0]).unwrap();
            assert!(first.is_background(world.scenario()));
        }
    }

    #[test]
    fn area_population_claims_sites_and_places_units() {
        let world = base_world();
        let crimson = world
            .factions
            .iter()
            .find(|f| f.name == "Crimson Pact")
            .unwrap();
        assert_eq!(crimson.units.len(), 1);
        assert!(crimson.sites.contains(&Coord { x: 1, y: 1 }));

        let home = world.site(Coord { x: 1, y: 1 }).unwrap();
        assert_eq!(home.owner, Some(crimson.id));
        assert_eq!(home.units.len(), 1);
        // Fortress on top of the background plains.
        assert_eq!(home.terrains.len(), 2);
    }

    #[test]
    fn multi_instance_unit_classes_get_numbered_names() {
        let world = base_world();
        let names: Vec<String> = world
            .entities
            .iter()
            .filter(|(_, e)| e.kind == EntityKind::Unit)
            .map(|(_, e)| e.name.clone())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"Infantry 1".to_string()));
        assert!(names.contains(&"Infantry 2".to_string()));
    }

    #[test]
    fn advance_faction_wraps_and_reports_the_new_turn_exactly_once() {
        let mut world = base_world();
        let factions = world.factions.len();
        assert_eq!(world.turn, 1);

        let mut new_turns = 0;
        for _ in 0..factions {
            if world.advance_faction().unwrap() {
                new_turns += 1;
            }
        }
        assert_eq!(world.active_faction, 0);
        assert_eq!(world.turn, 2);
        assert_eq!(new_turns, 1);
    }

    #[test]
    fn terrain_modifiers_raise_unit_defense_on_their_site() {
        let mut world = base_world();
        let scenario = world.scenario_arc();
        let unit = world.factions[1].units[0];
        let initial = world
            .entity(unit)
            .unwrap()
            .attributes
            .get(scenario.vars.defense)
            .unwrap()
            .initial;

        // The home site carries a fortress, so the unit starts boosted.
        assert_eq!(
            world.entity(unit).unwrap().attribute(scenario.vars.defense),
            initial + 3
        );

        // On forest only the forest modifier applies.
        world.place_entity(unit, Some(Coord { x: 4, y: 3 })).unwrap();
        world.refresh_modifiers();
        assert_eq!(
            world.entity(unit).unwrap().attribute(scenario.vars.defense),
            initial + 1
        );

        // On bare plains the attribute falls back to its initial value.
        world.place_entity(unit, Some(Coord { x: 3, y: 2 })).unwrap();
        world.refresh_modifiers();
        assert_eq!(
            world.entity(unit).unwrap().attribute(scenario.vars.defense),
            initial
        );
    }

    #[test]
    fn clone_state_is_fully_isolated_from_the_original() {
        let world = base_world();
        let mut clone = world.clone_state();

        let unit = clone.factions[0].units[0];
        let scenario = clone.scenario_arc();
        let before = world.entity(unit).unwrap().resource(scenario.vars.hits);

        clone
            .set_variable(
                VariableTarget::Entity { entity: unit },
                scenario.vars.hits,
                1,
                false,
            )
            .unwrap();
        clone.delete_entity(clone.factions[1].units[0]).unwrap();

        // The original never sees the clone's mutations.
        assert_eq!(world.entity(unit).unwrap().resource(scenario.vars.hits), before);
        assert_eq!(world.factions[1].units.len(), 1);
        assert_eq!(clone.factions[1].units.len(), 0);
    }

    #[test]
    fn deleting_the_active_last_faction_resets_the_index() {
        let yaml = br#"
name: Three Sides
map: { width: 6, height: 2, default_terrain: plains }
variables:
  movement: { name: Movement, category: attribute, minimum: 0, maximum: 99 }
  attack: { name: Attack, category: attribute, minimum: 0, maximum: 99 }
  defense: { name: Defense, category: attribute, minimum: 0, maximum: 99 }
  attack-range: { name: Attack Range, category: attribute, minimum: 0, maximum: 9 }
  sight: { name: Sight, category: attribute, minimum: 0, maximum: 9 }
  hits: { name: Hits, category: resource, minimum: 0, maximum: 100, limited: true }
  gold: { name: Gold, category: resource, minimum: 0, maximum: 99999 }
  moves-left: { name: Moves Left, category: resource, minimum: 0, maximum: 99 }
  builds: { name: Builds, category: resource, minimum: 0, maximum: 99 }
entities:
  plains: { name: Plains, kind: terrain, background: true, move_cost: 1 }
  militia:
    name: Militia
    kind: unit
    attributes: { movement: 2, attack: 2, defense: 1, attack-range: 1, sight: 2 }
    resources: { hits: 5 }
    decisive: [hits]
factions:
  alpha: { name: Alpha }
  bravo: { name: Bravo }
  charlie: { name: Charlie }
areas:
  - { from: { x: 0, y: 0 }, to: { x: 0, y: 0 }, owner: alpha, entities: [militia] }
  - { from: { x: 2, y: 0 }, to: { x: 2, y: 0 }, owner: bravo, entities: [militia] }
  - { from: { x: 4, y: 0 }, to: { x: 4, y: 0 }, owner: charlie, entities: [militia] }
"#;
        let scenario = Arc::new(load_scenario(ScenarioSource::Bytes(yaml)).unwrap());
        let mut world =
            WorldState::initialize(scenario, Arc::new(DefaultScript), &[]).unwrap();
        assert_eq!(world.factions.len(), 3);

        // Advance to the last faction, then delete it mid-turn.
        world.advance_faction().unwrap();
        world.advance_faction().unwrap();
        assert_eq!(world.active_faction, 2);
        let last = world.factions[2].id;

        world.delete_faction(last).unwrap();
        assert_eq!(world.factions.len(), 2);
        assert_eq!(world.active_faction, 0);
        assert!(world.faction(last).is_none());

        // Deleting below the active index shifts it down instead.
        world.advance_faction().unwrap();
        assert_eq!(world.active_faction, 1);
        let first = world.factions[0].id;
        world.delete_faction(first).unwrap();
        assert_eq!(world.active_faction, 0);
    }

    #[test]
    fn stale_references_resolve_to_none_but_keep_their_name() {
        let mut world = base_world();
        let unit = world.factions[0].units[0];
        let reference = world.entity_ref(unit).unwrap();
        assert_eq!(world.resolve_entity(&reference).unwrap().id, unit);

        world.delete_entity(unit).unwrap();
        assert!(world.resolve_entity(&reference).is_none());
        assert!(!reference.name.is_empty());
        // The history trail still knows the identity.
        assert!(world.history.entity(unit).unwrap().is_deleted());
    }
}
