use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ironmark_protocol::{VariableId, VariableValue};

use crate::error::InvariantViolation;
use crate::scenario::{CompiledScenario, VariableCategory, VariableClass};

/// Absolute range for modifier-purpose variables, independent of class bounds.
pub const MODIFIER_MINIMUM: i64 = -1_000_000;
pub const MODIFIER_MAXIMUM: i64 = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableRole {
    Basic,
    Modifier,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableHolder {
    Entity,
    Faction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariablePurpose {
    pub role: VariableRole,
    pub holder: VariableHolder,
    /// Set when the initial value came from scenario data.
    #[serde(default)]
    pub scenario: bool,
}

/// A typed, bounded numeric instance of a class-defined template.
///
/// Invariant: `minimum <= value <= maximum` for the effective range of the
/// variable's purpose. Every mutation re-clamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub class: VariableId,
    pub purpose: VariablePurpose,
    pub initial: i64,
    pub value: i64,
}

impl Variable {
    pub fn new(class: &VariableClass, id: VariableId, purpose: VariablePurpose, initial: i64) -> Self {
        let mut var = Self {
            class: id,
            purpose,
            initial: 0,
            value: 0,
        };
        var.initial = var.clamp_initial(class, initial);
        var.value = var.clamp(class, var.initial);
        var
    }

    /// Effective bounds for the current value, which depend on purpose:
    /// modifiers use the absolute wide range; basic limited resources are
    /// additionally capped by the initial value.
    pub fn bounds(&self, class: &VariableClass) -> (i64, i64) {
        if self.purpose.role == VariableRole::Modifier {
            return (MODIFIER_MINIMUM, MODIFIER_MAXIMUM);
        }
        let mut maximum = class.maximum;
        if class.category == VariableCategory::Resource && class.limited {
            maximum = maximum.min(self.initial);
        }
        (class.minimum, maximum)
    }

    fn clamp(&self, class: &VariableClass, value: i64) -> i64 {
        let (minimum, maximum) = self.bounds(class);
        value.clamp(minimum, maximum.max(minimum))
    }

    fn clamp_initial(&self, class: &VariableClass, value: i64) -> i64 {
        if self.purpose.role == VariableRole::Modifier {
            value.clamp(MODIFIER_MINIMUM, MODIFIER_MAXIMUM)
        } else {
            value.clamp(class.minimum, class.maximum)
        }
    }

    /// Sets the current value, clamped to the effective range. Returns whether
    /// anything changed.
    pub fn set_value(&mut self, class: &VariableClass, value: i64) -> bool {
        let clamped = self.clamp(class, value);
        if clamped == self.value {
            return false;
        }
        self.value = clamped;
        true
    }

    /// Sets the initial value. Attributes always derive from initial plus
    /// modifiers, so their current value resets; a limited resource clamps its
    /// current value downward if it now exceeds the new initial value.
    pub fn set_initial(&mut self, class: &VariableClass, value: i64) -> bool {
        let clamped = self.clamp_initial(class, value);
        let mut changed = clamped != self.initial;
        self.initial = clamped;

        match class.category {
            VariableCategory::Attribute => {
                if self.value != self.initial {
                    self.value = self.initial;
                    changed = true;
                }
            }
            VariableCategory::Resource => {
                if class.limited && self.value > self.initial {
                    self.value = self.initial;
                    changed = true;
                }
            }
        }
        changed
    }

    pub fn snapshot(&self) -> VariableValue {
        VariableValue {
            class: self.class,
            initial: self.initial,
            value: self.value,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
enum Storage {
    /// Aliases an immutable collection shared with a class template or a
    /// sibling snapshot. The first mutation allocates a private copy.
    Shared(Arc<Vec<Variable>>),
    Owned(Vec<Variable>),
}

/// An ordered, keyed collection of variables sharing one category and purpose.
///
/// Invariant: at most one variable per identifier. Read access is open; the
/// only mutation entry points are [`VariableContainer::set_value`] and
/// [`VariableContainer::import_changes`], reserved for the command pipeline
/// and the modifier pass.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VariableContainer {
    pub category: VariableCategory,
    pub purpose: VariablePurpose,
    storage: Storage,
}

impl VariableContainer {
    pub fn empty(category: VariableCategory, purpose: VariablePurpose) -> Self {
        Self {
            category,
            purpose,
            storage: Storage::Owned(Vec::new()),
        }
    }

    pub fn shared(
        category: VariableCategory,
        purpose: VariablePurpose,
        variables: Arc<Vec<Variable>>,
    ) -> Self {
        Self {
            category,
            purpose,
            storage: Storage::Shared(variables),
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.storage, Storage::Shared(_))
    }

    /// True when both containers still alias the same immutable collection.
    pub fn shares_storage_with(&self, other: &Self) -> bool {
        match (&self.storage, &other.storage) {
            (Storage::Shared(a), Storage::Shared(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn variables(&self) -> &[Variable] {
        match &self.storage {
            Storage::Shared(shared) => shared,
            Storage::Owned(owned) => owned,
        }
    }

    fn make_owned(&mut self) -> &mut Vec<Variable> {
        if let Storage::Shared(shared) = &self.storage {
            self.storage = Storage::Owned(shared.as_ref().clone());
        }
        match &mut self.storage {
            Storage::Owned(owned) => owned,
            Storage::Shared(_) => unreachable!(),
        }
    }

    pub fn get(&self, id: VariableId) -> Option<&Variable> {
        self.variables().iter().find(|v| v.class == id)
    }

    pub fn value(&self, id: VariableId) -> Option<i64> {
        self.get(id).map(|v| v.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables().iter()
    }

    pub fn len(&self) -> usize {
        self.variables().len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables().is_empty()
    }

    pub fn snapshot_values(&self) -> Vec<VariableValue> {
        self.variables().iter().map(Variable::snapshot).collect()
    }

    /// Adds or updates one variable, clamped per purpose. Lazily copies the
    /// storage if it currently aliases a shared collection and the write
    /// actually changes something. Returns whether anything changed.
    ///
    /// A class whose category differs from the container's is a programmer
    /// error.
    pub fn set_value(
        &mut self,
        scenario: &CompiledScenario,
        id: VariableId,
        value: i64,
        initial: bool,
    ) -> Result<bool, InvariantViolation> {
        let class = self.checked_class(scenario, id)?;

        match self.get(id) {
            Some(existing) => {
                // Probe on a copy first so an unchanged write never allocates.
                let mut probe = *existing;
                let changed = if initial {
                    probe.set_initial(class, value)
                } else {
                    probe.set_value(class, value)
                };
                if !changed {
                    return Ok(false);
                }
                let owned = self.make_owned();
                let slot = owned
                    .iter_mut()
                    .find(|v| v.class == id)
                    .expect("probed variable present");
                *slot = probe;
                Ok(true)
            }
            None => {
                let mut var = Variable::new(class, id, self.purpose, if initial { value } else { 0 });
                if !initial {
                    var.set_value(class, value);
                }
                self.make_owned().push(var);
                Ok(true)
            }
        }
    }

    /// Applies a batch of externally computed values under the same clamp and
    /// copy discipline. Keys with no matching variable are silently ignored;
    /// this entry point never inserts. Returns whether anything changed.
    pub fn import_changes(
        &mut self,
        scenario: &CompiledScenario,
        changes: &BTreeMap<VariableId, i64>,
    ) -> bool {
        let mut any_change = false;
        for (id, value) in changes {
            let Some(existing) = self.get(*id) else {
                continue;
            };
            let class = scenario.variable(*id);
            let mut probe = *existing;
            if !probe.set_value(class, *value) {
                continue;
            }
            let owned = self.make_owned();
            let slot = owned
                .iter_mut()
                .find(|v| v.class == *id)
                .expect("probed variable present");
            *slot = probe;
            any_change = true;
        }
        any_change
    }

    fn checked_class<'s>(
        &self,
        scenario: &'s CompiledScenario,
        id: VariableId,
    ) -> Result<&'s VariableClass, InvariantViolation> {
        let class = scenario
            .variables
            .get(id.raw as usize)
            .ok_or_else(|| InvariantViolation::new(format!("no variable class {}", id.raw)))?;
        if class.category != self.category {
            return Err(InvariantViolation::new(format!(
                "variable {} has category {:?}, container holds {:?}",
                class.data_id, class.category, self.category
            )));
        }
        Ok(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{load_scenario, ScenarioSource};

    fn scenario() -> CompiledScenario {
        load_scenario(ScenarioSource::Embedded).expect("embedded scenario loads")
    }

    fn basic_entity() -> VariablePurpose {
        VariablePurpose {
            role: VariableRole::Basic,
            holder: VariableHolder::Entity,
            scenario: false,
        }
    }

    #[test]
    fn set_value_clamps_to_class_range() {
        let scenario = scenario();
        let attack = scenario.vars.attack;
        let mut container = VariableContainer::empty(VariableCategory::Attribute, basic_entity());

        container.set_value(&scenario, attack, 10_000, false).unwrap();
        let class = scenario.variable(attack);
        assert_eq!(container.value(attack), Some(class.maximum));

        container.set_value(&scenario, attack, -10_000, false).unwrap();
        assert_eq!(container.value(attack), Some(class.minimum));
    }

    #[test]
    fn limited_resource_is_capped_by_initial_value() {
        let scenario = scenario();
        let ammo = scenario.variable_id("ammunition").unwrap();
        let mut container = VariableContainer::empty(VariableCategory::Resource, basic_entity());

        container.set_value(&scenario, ammo, 5, true).unwrap();
        assert_eq!(container.value(ammo), Some(5));

        // Cannot refill above the initial stock.
        container.set_value(&scenario, ammo, 9, false).unwrap();
        assert_eq!(container.value(ammo), Some(5));

        // Lowering the initial stock drags the current value down with it.
        container.set_value(&scenario, ammo, 3, true).unwrap();
        assert_eq!(container.value(ammo), Some(3));
    }

    #[test]
    fn attribute_initial_change_resets_current_value() {
        let scenario = scenario();
        let attack = scenario.vars.attack;
        let mut container = VariableContainer::empty(VariableCategory::Attribute, basic_entity());

        container.set_value(&scenario, attack, 4, true).unwrap();
        container.set_value(&scenario, attack, 7, false).unwrap();
        assert_eq!(container.value(attack), Some(7));

        container.set_value(&scenario, attack, 5, true).unwrap();
        assert_eq!(container.value(attack), Some(5));
    }

    #[test]
    fn category_mismatch_is_an_invariant_violation() {
        let scenario = scenario();
        let gold = scenario.variable_id("gold").unwrap();
        let mut container = VariableContainer::empty(VariableCategory::Attribute, basic_entity());
        assert!(container.set_value(&scenario, gold, 1, false).is_err());
    }

    #[test]
    fn shared_storage_is_kept_until_first_effective_mutation() {
        let scenario = scenario();
        let infantry = scenario.entity_class_id("infantry").unwrap();
        let template = scenario.entity_class(infantry).attribute_template.clone();
        let purpose = VariablePurpose {
            role: VariableRole::Basic,
            holder: VariableHolder::Entity,
            scenario: true,
        };

        let a = VariableContainer::shared(VariableCategory::Attribute, purpose, template.clone());
        let mut b = VariableContainer::shared(VariableCategory::Attribute, purpose, template);
        assert!(a.shares_storage_with(&b));

        // Writing the value already present must not allocate.
        let attack = scenario.vars.attack;
        let current = b.value(attack).unwrap();
        assert!(!b.set_value(&scenario, attack, current, false).unwrap());
        assert!(a.shares_storage_with(&b));

        // The first effective write diverges b and leaves a untouched.
        assert!(b.set_value(&scenario, attack, current + 1, false).unwrap());
        assert!(!a.shares_storage_with(&b));
        assert_eq!(a.value(attack), Some(current));
        assert_eq!(b.value(attack), Some(current + 1));
    }

    #[test]
    fn import_changes_ignores_unknown_keys_and_never_inserts() {
        let scenario = scenario();
        let attack = scenario.vars.attack;
        let defense = scenario.vars.defense;
        let mut container = VariableContainer::empty(VariableCategory::Attribute, basic_entity());
        container.set_value(&scenario, attack, 4, true).unwrap();

        let mut changes = BTreeMap::new();
        changes.insert(attack, 6);
        changes.insert(defense, 9);
        assert!(container.import_changes(&scenario, &changes));

        assert_eq!(container.value(attack), Some(6));
        assert_eq!(container.value(defense), None);
        assert_eq!(container.len(), 1);
    }
}
