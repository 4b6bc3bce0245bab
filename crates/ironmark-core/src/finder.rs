use ironmark_protocol::{Coord, EntityId, EntityKind, FactionId};

use crate::error::InvalidCommand;
use crate::search::{best_path, flood_fill, line_of_sight, PathResult, Reachable, SearchSpace};
use crate::world::WorldState;

/// Adapter exposing the movement/attack rules of one co-moving unit group to
/// the generic grid-search routines.
pub struct UnitAgent<'a> {
    world: &'a WorldState,
    units: Vec<EntityId>,
    owner: Option<FactionId>,
    start: Coord,
    /// Smallest remaining movement across the group.
    movement: i64,
}

impl<'a> UnitAgent<'a> {
    pub fn new(world: &'a WorldState, units: &[EntityId]) -> Result<Self, InvalidCommand> {
        let first = *units
            .first()
            .ok_or_else(|| InvalidCommand::Rule("empty unit group".into()))?;

        let mut owner = None;
        let mut start = None;
        let mut movement = i64::MAX;
        for id in units {
            let unit = world
                .entity(*id)
                .ok_or(InvalidCommand::UnknownEntity(*id))?;
            if unit.kind != EntityKind::Unit {
                return Err(InvalidCommand::NotAUnit {
                    name: unit.name.clone(),
                });
            }
            let Some(at) = unit.site else {
                return Err(InvalidCommand::NotPlaced {
                    name: unit.name.clone(),
                });
            };
            if *id == first {
                owner = unit.owner;
                start = Some(at);
            }
            movement = movement.min(unit.counter(world.scenario().vars.moves_left));
        }

        Ok(Self {
            world,
            units: units.to_vec(),
            owner,
            start: start.expect("group has a lead unit"),
            movement,
        })
    }

    pub fn start(&self) -> Coord {
        self.start
    }

    pub fn movement(&self) -> i64 {
        self.movement
    }

    pub fn units(&self) -> &[EntityId] {
        &self.units
    }

    fn site_hosts_enemy(&self, at: Coord) -> bool {
        let Some(site) = self.world.site(at) else {
            return false;
        };
        site.units.iter().any(|other| {
            !self.units.contains(other)
                && self
                    .world
                    .entity(*other)
                    .is_some_and(|u| u.owner != self.owner)
        })
    }
}

impl SearchSpace for UnitAgent<'_> {
    fn contains(&self, at: Coord) -> bool {
        self.world.grid.contains(at)
    }

    fn step_cost(&self, _from: Coord, to: Coord) -> Option<i64> {
        if self.site_hosts_enemy(to) {
            return None;
        }
        let site = self.world.site(to)?;
        Some(site.move_cost().max(1))
    }
}

/// Query families over the unit-agent adapter. Every query returns an owned
/// result; there is no shared result buffer and no outstanding-query limit.
pub struct Finder;

impl Finder {
    /// Move targets reachable by the whole group this turn, limited by the
    /// smallest remaining movement among the group.
    pub fn reachable_sites(
        world: &WorldState,
        units: &[EntityId],
    ) -> Result<Reachable, InvalidCommand> {
        let agent = UnitAgent::new(world, units)?;
        Ok(flood_fill(&agent, agent.start(), agent.movement()))
    }

    /// Cheapest path to the nearest of `goals`, ignoring the movement budget
    /// (callers split it across turns).
    pub fn path_to_nearest(
        world: &WorldState,
        units: &[EntityId],
        goals: &[Coord],
    ) -> Result<Option<PathResult>, InvalidCommand> {
        let agent = UnitAgent::new(world, units)?;
        Ok(best_path(&agent, agent.start(), goals))
    }

    /// Whether `attacker` can strike `target` from where it stands.
    ///
    /// The range test runs first; the visibility walk is only consulted when
    /// the target is within range and the attacker needs line of sight.
    pub fn are_units_in_attack_range(
        world: &WorldState,
        attacker: EntityId,
        target: EntityId,
    ) -> Result<bool, InvalidCommand> {
        let target_at = placed_site(world, target)?;
        let attacker_at = placed_site(world, attacker)?;
        Self::in_range_from(world, attacker, attacker_at, target_at)
    }

    /// What-if variant: could `attacker` strike a target on `target_at` if it
    /// stood on `from`? Used by AI lookahead without moving anything.
    pub fn in_range_from(
        world: &WorldState,
        attacker: EntityId,
        from: Coord,
        target_at: Coord,
    ) -> Result<bool, InvalidCommand> {
        let unit = world
            .entity(attacker)
            .ok_or(InvalidCommand::UnknownEntity(attacker))?;
        if unit.kind != EntityKind::Unit {
            return Err(InvalidCommand::NotAUnit {
                name: unit.name.clone(),
            });
        }
        let scenario = world.scenario();
        let range = unit.attribute(scenario.vars.attack_range);
        if from.distance(target_at) as i64 > range {
            return Ok(false);
        }
        if scenario.entity_class(unit.class).needs_sight {
            let visible = line_of_sight(from, target_at, |c| {
                world.site(c).is_some_and(|s| s.blocks_attack())
            });
            return Ok(visible);
        }
        Ok(true)
    }

    /// Enemy units `attacker` can strike right now, in stable id order.
    pub fn attack_targets(
        world: &WorldState,
        attacker: EntityId,
    ) -> Result<Vec<EntityId>, InvalidCommand> {
        let unit = world
            .entity(attacker)
            .ok_or(InvalidCommand::UnknownEntity(attacker))?;
        let owner = unit.owner;
        let mut targets = Vec::new();
        for (id, other) in world.entities.iter() {
            if id == attacker || other.kind != EntityKind::Unit {
                continue;
            }
            if other.owner == owner || other.site.is_none() {
                continue;
            }
            if Self::are_units_in_attack_range(world, attacker, id)? {
                targets.push(id);
            }
        }
        Ok(targets)
    }
}

fn placed_site(world: &WorldState, id: EntityId) -> Result<Coord, InvalidCommand> {
    let entity = world.entity(id).ok_or(InvalidCommand::UnknownEntity(id))?;
    entity.site.ok_or_else(|| InvalidCommand::NotPlaced {
        name: entity.name.clone(),
    })
}
