//! Dynamic region manager
//!
//! Hands out ids for instanced regions and tracks the live instances.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use super::entity::RegionId;
use super::region::Region;
use crate::error::RegionError;

pub struct DynamicRegionManager {
    range: RangeInclusive<RegionId>,
    reserved: Mutex<BTreeSet<RegionId>>,
    regions: DashMap<RegionId, Arc<Region>>,
}

impl DynamicRegionManager {
    pub fn new(range: RangeInclusive<RegionId>) -> Self {
        Self {
            range,
            reserved: Mutex::new(BTreeSet::new()),
            regions: DashMap::new(),
        }
    }

    /// Reserve the lowest free id in the range
    pub fn allocate_id(&self) -> Result<RegionId, RegionError> {
        let mut reserved = self.reserved.lock();
        let id = self
            .range
            .clone()
            .find(|id| !reserved.contains(id))
            .ok_or(RegionError::DynamicRegionsExhausted)?;
        reserved.insert(id);
        Ok(id)
    }

    /// Give an id back without registering a region under it
    pub fn release_id(&self, id: RegionId) {
        self.reserved.lock().remove(&id);
    }

    /// Track a region built on an allocated id
    pub fn add(&self, region: Arc<Region>) {
        debug!(region_id = region.id(), base_id = region.base_id(), "Dynamic region added");
        self.regions.insert(region.id(), region);
    }

    pub fn get(&self, id: RegionId) -> Option<Arc<Region>> {
        self.regions.get(&id).map(|r| r.value().clone())
    }

    /// Stop tracking a region and free its id
    pub fn remove(&self, id: RegionId) -> Option<Arc<Region>> {
        let removed = self.regions.remove(&id).map(|(_, r)| r);
        self.release_id(id);
        if removed.is_some() {
            debug!(region_id = id, "Dynamic region removed");
        }
        removed
    }

    pub fn contains(&self, id: RegionId) -> bool {
        self.regions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Snapshot of the live instances
    pub fn regions(&self) -> Vec<Arc<Region>> {
        self.regions.iter().map(|r| r.value().clone()).collect()
    }
}
