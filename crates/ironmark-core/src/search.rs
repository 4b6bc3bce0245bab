use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use ironmark_protocol::Coord;

/// Contract between the grid-search routines and an agent adapter.
pub trait SearchSpace {
    fn contains(&self, at: Coord) -> bool;

    /// Cost to step from `from` onto the adjacent `to`; `None` when the step
    /// is not feasible. Costs are at least 1.
    fn step_cost(&self, from: Coord, to: Coord) -> Option<i64>;

    /// Whether a path may end on `at`.
    fn can_stop(&self, at: Coord) -> bool {
        let _ = at;
        true
    }
}

/// Owned flood-fill result: every site reachable within the budget, with its
/// cheapest cost, in row-major order. The start site is included at cost 0.
#[derive(Clone, Debug, Default)]
pub struct Reachable {
    pub sites: Vec<(Coord, i64)>,
}

impl Reachable {
    pub fn contains(&self, at: Coord) -> bool {
        self.sites.iter().any(|(c, _)| *c == at)
    }

    pub fn cost_of(&self, at: Coord) -> Option<i64> {
        self.sites.iter().find(|(c, _)| *c == at).map(|(_, cost)| *cost)
    }
}

/// Uniform-cost flood fill from `start` up to `budget` total cost.
pub fn flood_fill(space: &impl SearchSpace, start: Coord, budget: i64) -> Reachable {
    if !space.contains(start) || budget < 0 {
        return Reachable::default();
    }

    let mut best: BTreeMap<(i32, i32), i64> = BTreeMap::new();
    best.insert((start.y, start.x), 0);
    let mut heap = BinaryHeap::new();
    heap.push(Reverse((0_i64, start.y, start.x)));

    while let Some(Reverse((cost, y, x))) = heap.pop() {
        let here = Coord { x, y };
        if best.get(&(y, x)).copied() != Some(cost) {
            continue;
        }
        for next in here.neighbors() {
            if !space.contains(next) {
                continue;
            }
            let Some(step) = space.step_cost(here, next) else {
                continue;
            };
            let total = cost + step.max(1);
            if total > budget {
                continue;
            }
            let key = (next.y, next.x);
            if best.get(&key).is_some_and(|known| *known <= total) {
                continue;
            }
            best.insert(key, total);
            heap.push(Reverse((total, next.y, next.x)));
        }
    }

    Reachable {
        sites: best
            .into_iter()
            .map(|((y, x), cost)| (Coord { x, y }, cost))
            .collect(),
    }
}

/// Owned path result. The path excludes the start site and ends on the goal.
#[derive(Clone, Debug)]
pub struct PathResult {
    pub path: Vec<Coord>,
    pub cost: i64,
}

/// A* toward the nearest of `goals`. Heuristic is the smallest Chebyshev
/// distance to any goal, admissible because step costs are at least 1.
pub fn best_path(space: &impl SearchSpace, start: Coord, goals: &[Coord]) -> Option<PathResult> {
    if goals.is_empty() || !space.contains(start) {
        return None;
    }
    let heuristic = |at: Coord| {
        goals
            .iter()
            .map(|g| at.distance(*g) as i64)
            .min()
            .unwrap_or(0)
    };
    let is_goal = |at: Coord| goals.contains(&at);

    if is_goal(start) {
        return Some(PathResult {
            path: Vec::new(),
            cost: 0,
        });
    }

    let mut best: BTreeMap<(i32, i32), i64> = BTreeMap::new();
    let mut parent: BTreeMap<(i32, i32), Coord> = BTreeMap::new();
    best.insert((start.y, start.x), 0);
    let mut heap = BinaryHeap::new();
    heap.push(Reverse((heuristic(start), 0_i64, start.y, start.x)));

    while let Some(Reverse((_, cost, y, x))) = heap.pop() {
        let here = Coord { x, y };
        if best.get(&(y, x)).copied() != Some(cost) {
            continue;
        }
        if is_goal(here) && space.can_stop(here) {
            let mut path = vec![here];
            let mut cursor = here;
            while let Some(prev) = parent.get(&(cursor.y, cursor.x)) {
                cursor = *prev;
                if cursor == start {
                    break;
                }
                path.push(cursor);
            }
            path.reverse();
            return Some(PathResult { path, cost });
        }
        for next in here.neighbors() {
            if !space.contains(next) {
                continue;
            }
            let Some(step) = space.step_cost(here, next) else {
                continue;
            };
            let total = cost + step.max(1);
            let key = (next.y, next.x);
            if best.get(&key).is_some_and(|known| *known <= total) {
                continue;
            }
            best.insert(key, total);
            parent.insert(key, here);
            heap.push(Reverse((total + heuristic(next), total, next.y, next.x)));
        }
    }
    None
}

/// Line-of-sight test: true when no interior site of the line walk between
/// the endpoints is blocked. Endpoints themselves never block.
pub fn line_of_sight(from: Coord, to: Coord, blocked: impl Fn(Coord) -> bool) -> bool {
    from.line_between(to).into_iter().all(|c| !blocked(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OpenField {
        width: i32,
        height: i32,
        wall: Option<Coord>,
    }

    impl SearchSpace for OpenField {
        fn contains(&self, at: Coord) -> bool {
            at.x >= 0 && at.y >= 0 && at.x < self.width && at.y < self.height
        }

        fn step_cost(&self, _from: Coord, to: Coord) -> Option<i64> {
            if self.wall == Some(to) {
                None
            } else {
                Some(1)
            }
        }
    }

    #[test]
    fn flood_fill_respects_the_budget() {
        let field = OpenField {
            width: 10,
            height: 10,
            wall: None,
        };
        let start = Coord { x: 5, y: 5 };
        let reachable = flood_fill(&field, start, 2);
        // A 5x5 Chebyshev square around the start.
        assert_eq!(reachable.sites.len(), 25);
        assert_eq!(reachable.cost_of(start), Some(0));
        assert!(!reachable.contains(Coord { x: 8, y: 5 }));
    }

    #[test]
    fn best_path_routes_around_walls() {
        let field = OpenField {
            width: 5,
            height: 1,
            wall: Some(Coord { x: 2, y: 0 }),
        };
        // One row with a wall in the middle: x=4 is unreachable.
        let start = Coord { x: 0, y: 0 };
        assert!(best_path(&field, start, &[Coord { x: 4, y: 0 }]).is_none());

        let open = OpenField {
            width: 5,
            height: 2,
            wall: Some(Coord { x: 2, y: 0 }),
        };
        let result = best_path(&open, start, &[Coord { x: 4, y: 0 }]).unwrap();
        assert_eq!(result.cost, 4);
        assert_eq!(result.path.last(), Some(&Coord { x: 4, y: 0 }));
    }

    #[test]
    fn best_path_picks_the_nearest_goal() {
        let field = OpenField {
            width: 10,
            height: 1,
            wall: None,
        };
        let result = best_path(
            &field,
            Coord { x: 3, y: 0 },
            &[Coord { x: 9, y: 0 }, Coord { x: 5, y: 0 }],
        )
        .unwrap();
        assert_eq!(result.cost, 2);
        assert_eq!(result.path.last(), Some(&Coord { x: 5, y: 0 }));
    }

    #[test]
    fn line_of_sight_sees_past_endpoints_only() {
        let wall = Coord { x: 2, y: 0 };
        let blocked = |c: Coord| c == wall;
        assert!(!line_of_sight(Coord { x: 0, y: 0 }, Coord { x: 4, y: 0 }, blocked));
        // The blocked site as an endpoint does not block itself.
        assert!(line_of_sight(Coord { x: 1, y: 0 }, wall, blocked));
    }
}
