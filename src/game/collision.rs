//! Region collision geometry

use super::position::Position;
use crate::data::CollisionData;

/// Line segments creatures can't cross
#[derive(Debug, Clone, Default)]
pub struct RegionCollisions {
    segments: Vec<(Position, Position)>,
}

impl RegionCollisions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load segments from zone data
    pub fn load(&mut self, data: &[CollisionData]) {
        self.segments
            .extend(data.iter().map(|c| (c.from(), c.to())));
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Check whether moving from `from` to `to` crosses any segment
    pub fn any(&self, from: Position, to: Position) -> bool {
        self.segments
            .iter()
            .any(|&(a, b)| segments_intersect(from, to, a, b))
    }
}

fn orientation(a: Position, b: Position, c: Position) -> i8 {
    let v = (b.x as i64 - a.x as i64) * (c.y as i64 - a.y as i64)
        - (b.y as i64 - a.y as i64) * (c.x as i64 - a.x as i64);
    v.signum() as i8
}

fn on_segment(a: Position, b: Position, p: Position) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

fn segments_intersect(p1: Position, p2: Position, q1: Position, q2: Position) -> bool {
    let o1 = orientation(p1, p2, q1);
    let o2 = orientation(p1, p2, q2);
    let o3 = orientation(q1, q2, p1);
    let o4 = orientation(q1, q2, p2);

    if o1 != o2 && o3 != o4 {
        return true;
    }

    // Collinear touching
    (o1 == 0 && on_segment(p1, p2, q1))
        || (o2 == 0 && on_segment(p1, p2, q2))
        || (o3 == 0 && on_segment(q1, q2, p1))
        || (o4 == 0 && on_segment(q1, q2, p2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall() -> RegionCollisions {
        let mut collisions = RegionCollisions::new();
        collisions.load(&[CollisionData {
            x1: 0,
            y1: 500,
            x2: 1000,
            y2: 500,
        }]);
        collisions
    }

    #[test]
    fn test_crossing_wall() {
        let collisions = wall();
        assert_eq!(collisions.len(), 1);
        assert!(collisions.any(Position::new(500, 0), Position::new(500, 1000)));
    }

    #[test]
    fn test_parallel_path() {
        let collisions = wall();
        assert!(!collisions.any(Position::new(0, 0), Position::new(1000, 0)));
        assert!(!collisions.any(Position::new(1500, 0), Position::new(1500, 1000)));
    }

    #[test]
    fn test_empty() {
        assert!(!RegionCollisions::new().any(Position::new(0, 0), Position::new(10, 10)));
    }
}
