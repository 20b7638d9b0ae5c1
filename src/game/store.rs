//! Entity store
//!
//! Three independent collections per region, each behind its own
//! reader/writer lock. Queries copy matching handles out under the read lock
//! and release it before returning; a query spanning several collections
//! takes each lock in turn, never two at once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{error, trace};

use super::creature::Creature;
use super::entity::{Entity, EntityHandle, EntityId, EntityKind, RegionId};
use super::item::Item;
use super::position::Position;
use super::prop::Prop;
use crate::error::RegionError;

/// One id-indexed collection
pub struct Collection<T: Entity> {
    kind: EntityKind,
    entities: RwLock<HashMap<EntityId, Arc<T>>>,
}

impl<T: Entity> Collection<T> {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// Insert, refusing ids already present
    pub fn insert(&self, entity: Arc<T>) -> Result<(), RegionError> {
        let mut entities = self.entities.write();
        let id = entity.id();
        if entities.contains_key(&id) {
            return Err(RegionError::DuplicateId {
                kind: self.kind,
                id,
            });
        }
        entities.insert(id, entity);
        Ok(())
    }

    pub fn remove(&self, id: EntityId) -> Option<Arc<T>> {
        self.entities.write().remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<Arc<T>> {
        self.entities.read().get(&id).cloned()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.read().contains_key(&id)
    }

    /// First entity matching `pred`
    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<Arc<T>> {
        self.entities.read().values().find(|e| pred(e)).cloned()
    }

    /// Snapshot of all entities matching `pred`
    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<Arc<T>> {
        self.entities
            .read()
            .values()
            .filter(|e| pred(e))
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Arc<T>> {
        self.entities.read().values().cloned().collect()
    }

    pub fn count(&self, pred: impl Fn(&T) -> bool) -> usize {
        self.entities.read().values().filter(|e| pred(e)).count()
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Remove everything matching `pred` in one write-locked pass
    pub fn drain_where(&self, pred: impl Fn(&T) -> bool) -> Vec<Arc<T>> {
        let mut entities = self.entities.write();
        let ids: Vec<EntityId> = entities
            .values()
            .filter(|e| pred(e))
            .map(|e| e.id())
            .collect();
        ids.into_iter().filter_map(|id| entities.remove(&id)).collect()
    }
}

/// Which props a range query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropScope {
    /// Only props within the radius
    InRange,
    /// Every always-visible prop, wherever it is
    AllVisible,
}

/// Entities removed by an expiry sweep
#[derive(Debug, Default)]
pub struct ExpiredEntities {
    pub creatures: Vec<Arc<Creature>>,
    pub props: Vec<Arc<Prop>>,
    pub items: Vec<Arc<Item>>,
}

impl ExpiredEntities {
    pub fn is_empty(&self) -> bool {
        self.creatures.is_empty() && self.props.is_empty() && self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.creatures.len() + self.props.len() + self.items.len()
    }
}

/// All entities of one region
pub struct EntityStore {
    region_id: RegionId,
    pub creatures: Collection<Creature>,
    pub props: Collection<Prop>,
    pub items: Collection<Item>,
}

impl EntityStore {
    pub fn new(region_id: RegionId) -> Self {
        Self {
            region_id,
            creatures: Collection::new(EntityKind::Creature),
            props: Collection::new(EntityKind::Prop),
            items: Collection::new(EntityKind::Item),
        }
    }

    pub fn region_id(&self) -> RegionId {
        self.region_id
    }

    pub fn add_creature(&self, creature: Arc<Creature>) -> Result<(), RegionError> {
        self.add(&self.creatures, creature)
    }

    pub fn add_prop(&self, prop: Arc<Prop>) -> Result<(), RegionError> {
        self.add(&self.props, prop)
    }

    pub fn add_item(&self, item: Arc<Item>) -> Result<(), RegionError> {
        self.add(&self.items, item)
    }

    fn add<T: Entity>(&self, collection: &Collection<T>, entity: Arc<T>) -> Result<(), RegionError> {
        let previous = entity
            .claim_region(self.region_id)
            .map_err(|owner| RegionError::EntityOwned {
                id: entity.id(),
                region: owner,
            })?;

        if let Err(err) = collection.insert(entity.clone()) {
            if previous.is_none() {
                entity.release_region(self.region_id);
            }
            return Err(err);
        }

        trace!(region_id = self.region_id, kind = %entity.kind(), id = entity.id(), "Entity added");
        Ok(())
    }

    /// Remove a creature; `None` if it wasn't here
    pub fn remove_creature(&self, id: EntityId) -> Option<Arc<Creature>> {
        self.remove(&self.creatures, id)
    }

    pub fn remove_item(&self, id: EntityId) -> Option<Arc<Item>> {
        self.remove(&self.items, id)
    }

    /// Remove a prop
    ///
    /// Client props stay in the collection; their expiry is cleared so the
    /// maintenance pass doesn't keep retrying.
    pub fn remove_prop(&self, id: EntityId) -> Option<Arc<Prop>> {
        let prop = self.props.get(id)?;
        if prop.is_fixed() {
            error!(
                region_id = self.region_id,
                prop_id = id,
                "Client props can't be removed, resetting expiry"
            );
            prop.set_disappear_at(None);
            return None;
        }
        self.remove(&self.props, id)
    }

    fn remove<T: Entity>(&self, collection: &Collection<T>, id: EntityId) -> Option<Arc<T>> {
        let entity = collection.remove(id)?;
        entity.release_region(self.region_id);
        trace!(region_id = self.region_id, kind = %entity.kind(), id = id, "Entity removed");
        Some(entity)
    }

    /// Creatures within `radius` of `pos`
    pub fn creatures_in_range(&self, pos: Position, radius: i32) -> Vec<Arc<Creature>> {
        self.creatures
            .filter(|c| c.position().in_range(&pos, radius))
    }

    pub fn items_in_range(&self, pos: Position, radius: i32) -> Vec<Arc<Item>> {
        self.items.filter(|i| i.position().in_range(&pos, radius))
    }

    pub fn props_in_range(&self, pos: Position, radius: i32) -> Vec<Arc<Prop>> {
        self.props.filter(|p| p.position().in_range(&pos, radius))
    }

    /// Server props and client props with changed state, regardless of range
    pub fn always_visible_props(&self) -> Vec<Arc<Prop>> {
        self.props.filter(|p| p.is_always_visible())
    }

    /// Snapshot of everything within `radius` of `pos`
    pub fn range_query(&self, pos: Position, radius: i32, scope: PropScope) -> Vec<EntityHandle> {
        let mut result: Vec<EntityHandle> = self
            .creatures_in_range(pos, radius)
            .into_iter()
            .map(EntityHandle::Creature)
            .collect();

        let props = match scope {
            PropScope::InRange => self.props_in_range(pos, radius),
            PropScope::AllVisible => self.always_visible_props(),
        };
        result.extend(props.into_iter().map(EntityHandle::Prop));

        result.extend(
            self.items_in_range(pos, radius)
                .into_iter()
                .map(EntityHandle::Item),
        );

        result
    }

    /// Snapshot of everything inside the polygon
    pub fn polygon_query(&self, points: &[Position]) -> Vec<EntityHandle> {
        let mut result: Vec<EntityHandle> = self
            .creatures
            .filter(|c| c.position().in_polygon(points))
            .into_iter()
            .map(EntityHandle::Creature)
            .collect();
        result.extend(
            self.props
                .filter(|p| p.position().in_polygon(points))
                .into_iter()
                .map(EntityHandle::Prop),
        );
        result.extend(
            self.items
                .filter(|i| i.position().in_polygon(points))
                .into_iter()
                .map(EntityHandle::Item),
        );
        result
    }

    /// Remove every entity whose expiry has passed
    pub fn remove_expired(&self, now: DateTime<Utc>) -> ExpiredEntities {
        let creatures = self.creatures.drain_where(|c| c.is_expired(now));
        let items = self.items.drain_where(|i| i.is_expired(now));

        for fixed in self.props.filter(|p| p.is_fixed() && p.is_expired(now)) {
            error!(
                region_id = self.region_id,
                prop_id = fixed.id(),
                "Client prop expired, resetting expiry"
            );
            fixed.set_disappear_at(None);
        }
        let props = self
            .props
            .drain_where(|p| !p.is_fixed() && p.is_expired(now));

        let expired = ExpiredEntities {
            creatures,
            props,
            items,
        };

        for c in &expired.creatures {
            c.release_region(self.region_id);
        }
        for p in &expired.props {
            p.release_region(self.region_id);
        }
        for i in &expired.items {
            i.release_region(self.region_id);
        }

        expired
    }
}
