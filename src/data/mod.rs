//! Static game data
//!
//! Read-only zone, race and item definitions loaded once at startup from
//! `<data_path>/world.json`. Regions copy what they need at construction
//! and never write back.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::DataError;
use crate::game::entity::{EntityId, RegionId};
use crate::game::position::Position;

/// Region (zone) definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionInfoData {
    pub id: RegionId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub areas: Vec<AreaData>,
    #[serde(default)]
    pub collisions: Vec<CollisionData>,
}

/// Rectangular area inside a region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaData {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    #[serde(default)]
    pub props: Vec<PropData>,
    #[serde(default)]
    pub events: Vec<EventData>,
}

impl AreaData {
    /// Check whether a point lies in this area (min inclusive, max exclusive)
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let (min_x, max_x) = (self.x1.min(self.x2), self.x1.max(self.x2));
        let (min_y, max_y) = (self.y1.min(self.y2), self.y1.max(self.y2));
        x >= min_x && x < max_x && y >= min_y && y < max_y
    }
}

/// Prop the client already knows from its zone files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropData {
    pub entity_id: EntityId,
    pub class_id: u32,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub direction: f32,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub drop_type: Option<i32>,
}

fn default_scale() -> f32 {
    1.0
}

/// Client event (trigger area, spawn marker, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub id: EntityId,
    #[serde(default)]
    pub kind: i32,
    pub x: i32,
    pub y: i32,
}

/// Collision line segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionData {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl CollisionData {
    pub fn from(&self) -> Position {
        Position::new(self.x1, self.y1)
    }

    pub fn to(&self) -> Position {
        Position::new(self.x2, self.y2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceData {
    pub id: u32,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemData {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: u32,
}

/// On-disk layout of world.json
#[derive(Debug, Default, Deserialize)]
struct WorldFile {
    #[serde(default)]
    regions: Vec<RegionInfoData>,
    #[serde(default)]
    races: Vec<RaceData>,
    #[serde(default)]
    items: Vec<ItemData>,
}

/// Read-only game data provider
#[derive(Debug, Clone, Default)]
pub struct GameData {
    regions: HashMap<RegionId, RegionInfoData>,
    races: HashMap<u32, RaceData>,
    items: HashMap<u32, ItemData>,
}

impl GameData {
    /// Load from a world.json file
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path)?;
        let data = Self::from_json(&content)?;

        info!(
            path = %path.display(),
            regions = data.regions.len(),
            races = data.races.len(),
            items = data.items.len(),
            "Game data loaded"
        );

        Ok(data)
    }

    /// Parse a world.json document
    pub fn from_json(content: &str) -> Result<Self, DataError> {
        let file: WorldFile = serde_json::from_str(content)?;

        Ok(Self {
            regions: file.regions.into_iter().map(|r| (r.id, r)).collect(),
            races: file.races.into_iter().map(|r| (r.id, r)).collect(),
            items: file.items.into_iter().map(|i| (i.id, i)).collect(),
        })
    }

    pub fn with_region(mut self, region: RegionInfoData) -> Self {
        self.regions.insert(region.id, region);
        self
    }

    pub fn with_race(mut self, race: RaceData) -> Self {
        self.races.insert(race.id, race);
        self
    }

    pub fn with_item(mut self, item: ItemData) -> Self {
        self.items.insert(item.id, item);
        self
    }

    pub fn region_info(&self, id: RegionId) -> Option<&RegionInfoData> {
        self.regions.get(&id)
    }

    pub fn race(&self, id: u32) -> Option<&RaceData> {
        self.races.get(&id)
    }

    pub fn item(&self, id: u32) -> Option<&ItemData> {
        self.items.get(&id)
    }

    /// Ids of all defined regions, sorted
    pub fn region_ids(&self) -> Vec<RegionId> {
        let mut ids: Vec<_> = self.regions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
