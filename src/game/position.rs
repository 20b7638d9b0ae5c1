//! Spatial positions
//!
//! Immutable 2D points plus the range and polygon tests the region
//! queries are built on.

use serde::{Deserialize, Serialize};

use super::entity::RegionId;

/// A point on a region's plane
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate
    pub x: i32,
    /// Y coordinate
    pub y: i32,
}

impl Position {
    /// Create a new position
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = (self.x as i64 - other.x as i64) as f64;
        let dy = (self.y as i64 - other.y as i64) as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// Check whether `other` lies within `range` of this position (inclusive)
    pub fn in_range(&self, other: &Position, range: i32) -> bool {
        let dx = self.x as i128 - other.x as i128;
        let dy = self.y as i128 - other.y as i128;
        let range = range as i128;
        dx * dx + dy * dy <= range * range
    }

    /// Check whether this position lies inside the polygon described by `points`
    ///
    /// Uses the even-odd rule; polygons with fewer than three points contain
    /// nothing.
    pub fn in_polygon(&self, points: &[Position]) -> bool {
        if points.len() < 3 {
            return false;
        }

        let (px, py) = (self.x as f64, self.y as f64);
        let mut inside = false;
        let mut j = points.len() - 1;

        for i in 0..points.len() {
            let (xi, yi) = (points[i].x as f64, points[i].y as f64);
            let (xj, yj) = (points[j].x as f64, points[j].y as f64);

            if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }

        inside
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A position qualified with the region it belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Region id
    pub region_id: RegionId,
    /// X coordinate
    pub x: i32,
    /// Y coordinate
    pub y: i32,
}

impl Location {
    /// Create a new location
    pub const fn new(region_id: RegionId, x: i32, y: i32) -> Self {
        Self { region_id, x, y }
    }

    /// Create a location from a region id and a position
    pub const fn from_position(region_id: RegionId, position: Position) -> Self {
        Self {
            region_id,
            x: position.x,
            y: position.y,
        }
    }

    /// Get the position part of this location
    pub const fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@({}, {})", self.region_id, self.x, self.y)
    }
}
