use serde::{Deserialize, Serialize};

use ironmark_protocol::EntityId;

use crate::entity::Entity;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Slot {
    generation: u32,
    entity: Option<Entity>,
}

/// Deterministic, generational storage for every entity of one world.
///
/// - Stable iteration order: ascending slot index.
/// - Handles stay safe after removal: a stale `EntityId` resolves to `None`
///   because its generation no longer matches.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EntityStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: u32,
}

impl EntityStore {
    /// Allocates a slot, hands its id to `make`, and stores the result.
    pub fn allocate(&mut self, make: impl FnOnce(EntityId) -> Entity) -> EntityId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.entity.is_none());
            let id = EntityId::new(index, slot.generation);
            slot.entity = Some(make(id));
            id
        } else {
            let index = self.slots.len() as u32;
            let id = EntityId::new(index, 0);
            self.slots.push(Slot {
                generation: 0,
                entity: Some(make(id)),
            });
            id
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation == id.generation {
            slot.entity.as_ref()
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation == id.generation {
            slot.entity.as_mut()
        } else {
            None
        }
    }

    /// Frees the slot. The removed entity's identity is never reissued with
    /// the same generation, so outstanding references go stale instead of
    /// aliasing a newcomer.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let entity = slot.entity.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(entity)
    }

    pub fn len(&self) -> usize {
        self.live as usize
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let entity = slot.entity.as_ref()?;
            Some((EntityId::new(index as u32, slot.generation), entity))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut Entity)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                let id = EntityId::new(index as u32, slot.generation);
                Some((id, slot.entity.as_mut()?))
            })
    }

    /// Live ids in stable order, for loops that mutate the store while walking.
    pub fn ids(&self) -> Vec<EntityId> {
        self.iter().map(|(id, _)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{load_scenario, ScenarioSource};

    #[test]
    fn removed_ids_go_stale_and_slots_recycle() {
        let scenario = load_scenario(ScenarioSource::Embedded).unwrap();
        let class = scenario.entity_class_id("infantry").unwrap();
        let mut store = EntityStore::default();

        let a = store.allocate(|id| {
            Entity::from_class(&scenario, id, class, None, "A".into())
        });
        assert!(store.contains(a));
        assert_eq!(store.len(), 1);

        store.remove(a).unwrap();
        assert!(!store.contains(a));
        assert_eq!(store.len(), 0);

        let b = store.allocate(|id| {
            Entity::from_class(&scenario, id, class, None, "B".into())
        });
        assert_eq!(b.index, a.index);
        assert_ne!(b.generation, a.generation);
        assert!(store.get(a).is_none());
        assert_eq!(store.get(b).unwrap().name, "B");
    }
}
