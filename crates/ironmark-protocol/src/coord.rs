use serde::{Deserialize, Serialize};

/// Coordinates on the rectangular site grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub const DIRECTIONS: [Coord; 8] = [
        Coord { x: 1, y: 0 },   // East
        Coord { x: 1, y: -1 },  // Northeast
        Coord { x: 0, y: -1 },  // North
        Coord { x: -1, y: -1 }, // Northwest
        Coord { x: -1, y: 0 },  // West
        Coord { x: -1, y: 1 },  // Southwest
        Coord { x: 0, y: 1 },   // South
        Coord { x: 1, y: 1 },   // Southeast
    ];

    pub fn neighbors(self) -> impl Iterator<Item = Coord> {
        Self::DIRECTIONS.into_iter().map(move |d| self + d)
    }

    /// Chebyshev distance: diagonal steps count as one.
    #[inline]
    pub fn distance(self, other: Coord) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    #[inline]
    pub fn is_adjacent(self, other: Coord) -> bool {
        self != other && self.distance(other) == 1
    }

    /// All coords with distance `<= radius`, in a deterministic row-major order.
    pub fn ring_inclusive(self, radius: i32) -> impl Iterator<Item = Coord> {
        let radius = radius.max(0);
        (-radius..=radius).flat_map(move |dy| {
            (-radius..=radius).map(move |dx| Coord {
                x: self.x + dx,
                y: self.y + dy,
            })
        })
    }

    /// Interior coords of the straight line walk toward `other`, endpoints excluded.
    ///
    /// Symmetric: `a.line_between(b)` visits the same coords as `b.line_between(a)`.
    pub fn line_between(self, other: Coord) -> Vec<Coord> {
        let steps = self.distance(other);
        if steps <= 1 {
            return Vec::new();
        }

        let mut out = Vec::with_capacity((steps - 1) as usize);
        for i in 1..steps {
            // Rounded linear interpolation in doubled coordinates keeps the walk
            // symmetric under endpoint exchange.
            let x2 = 2 * self.x * (steps - i) + 2 * other.x * i;
            let y2 = 2 * self.y * (steps - i) + 2 * other.y * i;
            out.push(Coord {
                x: x2.div_euclid(2 * steps),
                y: y2.div_euclid(2 * steps),
            });
        }
        out
    }
}

impl std::ops::Add for Coord {
    type Output = Coord;

    fn add(self, other: Coord) -> Coord {
        Coord {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl std::fmt::Display for Coord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_counts_diagonals_once() {
        let a = Coord { x: 0, y: 0 };
        let b = Coord { x: 3, y: -2 };
        assert_eq!(a.distance(b), 3);
    }

    #[test]
    fn neighbors_has_eight_adjacent() {
        let center = Coord { x: 4, y: 4 };
        let neighbors: Vec<_> = center.neighbors().collect();
        assert_eq!(neighbors.len(), 8);
        assert!(neighbors.iter().all(|n| center.distance(*n) == 1));
    }

    #[test]
    fn ring_inclusive_counts_match_square_formula() {
        let center = Coord { x: 0, y: 0 };
        for radius in 0..=4 {
            let count = center.ring_inclusive(radius).count() as i32;
            let side = 2 * radius + 1;
            assert_eq!(count, side * side);
        }
    }

    #[test]
    fn line_between_is_symmetric() {
        let a = Coord { x: 0, y: 0 };
        let b = Coord { x: 5, y: 2 };
        let mut forward = a.line_between(b);
        let mut backward = b.line_between(a);
        forward.sort();
        backward.sort();
        assert_eq!(forward, backward);
    }

    #[test]
    fn line_between_adjacent_is_empty() {
        let a = Coord { x: 2, y: 2 };
        let b = Coord { x: 3, y: 3 };
        assert!(a.line_between(b).is_empty());
    }
}
