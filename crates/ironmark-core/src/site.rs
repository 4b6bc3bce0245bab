use serde::{Deserialize, Serialize};

use ironmark_protocol::{Coord, EntityId, EntityKind, FactionId, GridSnapshot, SiteSnapshot};

/// One map cell: owner plus ordered entity stacks per kind.
///
/// Invariant: a populated site has exactly one background terrain, at stack
/// index 0. The derived valuation (move cost, attack blocking) is recomputed
/// lazily after terrain changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Site {
    pub at: Coord,
    pub owner: Option<FactionId>,
    pub terrains: Vec<EntityId>,
    pub units: Vec<EntityId>,
    pub effects: Vec<EntityId>,
    move_cost: i64,
    blocks_attack: bool,
    dirty: bool,
}

impl Site {
    fn new(at: Coord) -> Self {
        Self {
            at,
            owner: None,
            terrains: Vec::new(),
            units: Vec::new(),
            effects: Vec::new(),
            move_cost: 1,
            blocks_attack: false,
            dirty: true,
        }
    }

    pub fn stack(&self, kind: EntityKind) -> Option<&Vec<EntityId>> {
        match kind {
            EntityKind::Terrain => Some(&self.terrains),
            EntityKind::Unit => Some(&self.units),
            EntityKind::Effect => Some(&self.effects),
            EntityKind::Upgrade => None,
        }
    }

    pub fn stack_mut(&mut self, kind: EntityKind) -> Option<&mut Vec<EntityId>> {
        match kind {
            EntityKind::Terrain => Some(&mut self.terrains),
            EntityKind::Unit => Some(&mut self.units),
            EntityKind::Effect => Some(&mut self.effects),
            EntityKind::Upgrade => None,
        }
    }

    pub fn is_populated(&self) -> bool {
        !self.terrains.is_empty()
    }

    /// Cost for a unit to step onto this site.
    pub fn move_cost(&self) -> i64 {
        debug_assert!(!self.dirty, "valuation read before recompute");
        self.move_cost
    }

    /// Whether this site blocks line of sight for ranged attacks.
    pub fn blocks_attack(&self) -> bool {
        debug_assert!(!self.dirty, "valuation read before recompute");
        self.blocks_attack
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn set_valuation(&mut self, move_cost: i64, blocks_attack: bool) {
        self.move_cost = move_cost;
        self.blocks_attack = blocks_attack;
        self.dirty = false;
    }

    pub fn snapshot(&self) -> SiteSnapshot {
        SiteSnapshot {
            owner: self.owner,
            move_cost: self.move_cost,
            blocks_attack: self.blocks_attack,
            terrains: self.terrains.clone(),
            units: self.units.clone(),
            effects: self.effects.clone(),
        }
    }
}

/// The fixed-dimension 2-D array of sites for one scenario map.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SiteGrid {
    width: u32,
    height: u32,
    sites: Vec<Site>,
}

impl SiteGrid {
    pub fn new(width: u32, height: u32) -> Self {
        let mut sites = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                sites.push(Site::new(Coord { x, y }));
            }
        }
        Self {
            width,
            height,
            sites,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn contains(&self, at: Coord) -> bool {
        at.x >= 0 && at.y >= 0 && (at.x as u32) < self.width && (at.y as u32) < self.height
    }

    pub fn index_of(&self, at: Coord) -> Option<usize> {
        if !self.contains(at) {
            return None;
        }
        Some((at.y as usize) * (self.width as usize) + (at.x as usize))
    }

    pub fn get(&self, at: Coord) -> Option<&Site> {
        self.index_of(at).map(|i| &self.sites[i])
    }

    pub fn get_mut(&mut self, at: Coord) -> Option<&mut Site> {
        self.index_of(at).map(move |i| &mut self.sites[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Site> {
        self.sites.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Site> {
        self.sites.iter_mut()
    }

    /// In-bounds neighbors of `at`, in direction-table order.
    pub fn neighbors(&self, at: Coord) -> impl Iterator<Item = Coord> + '_ {
        at.neighbors().filter(|c| self.contains(*c))
    }

    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            width: self.width,
            height: self.height,
            sites: self.sites.iter().map(Site::snapshot).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_indexing_is_row_major_and_bounded() {
        let grid = SiteGrid::new(4, 3);
        assert_eq!(grid.index_of(Coord { x: 0, y: 0 }), Some(0));
        assert_eq!(grid.index_of(Coord { x: 3, y: 2 }), Some(11));
        assert_eq!(grid.index_of(Coord { x: 4, y: 0 }), None);
        assert_eq!(grid.index_of(Coord { x: 0, y: -1 }), None);
    }

    #[test]
    fn corner_site_has_three_neighbors() {
        let grid = SiteGrid::new(4, 3);
        let corner: Vec<_> = grid.neighbors(Coord { x: 0, y: 0 }).collect();
        assert_eq!(corner.len(), 3);
        let center: Vec<_> = grid.neighbors(Coord { x: 1, y: 1 }).collect();
        assert_eq!(center.len(), 8);
    }
}
