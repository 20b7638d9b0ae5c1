//! Entity module
//!
//! Base identity shared by everything that can be placed in a region:
//! - Entity ids and kinds
//! - Owning-region back-reference (id based, never a live pointer)
//! - Optional expiry timestamp
//! - Type-erased handles used by visibility and range queries

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::creature::Creature;
use super::item::Item;
use super::position::{Location, Position};
use super::prop::Prop;

/// Unique 64-bit entity identifier
pub type EntityId = u64;

/// Region identifier
pub type RegionId = i32;

/// First id handed out to player creatures
pub const PLAYER_ID_START: EntityId = 0x0010_0000_0000_0001;

/// First id handed out to NPCs
pub const NPC_ID_START: EntityId = 0x0010_F000_0000_0001;

/// First id handed out to items
pub const ITEM_ID_START: EntityId = 0x0050_0000_0000_0001;

/// First id handed out to server-side props
pub const PROP_ID_START: EntityId = 0x00A0_1000_0000_0001;

/// Entity kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Creature,
    Prop,
    Item,
}

impl EntityKind {
    /// Get a human-readable name for the kind
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Creature => "Creature",
            EntityKind::Prop => "Prop",
            EntityKind::Item => "Item",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Identity of an entity across all three collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id }
    }
}

/// State common to every entity
#[derive(Debug)]
pub struct EntityCore {
    id: EntityId,
    kind: EntityKind,
    location: RwLock<Location>,
    region: RwLock<Option<RegionId>>,
    disappear_at: RwLock<Option<DateTime<Utc>>>,
}

impl EntityCore {
    /// Create the common entity state
    pub fn new(id: EntityId, kind: EntityKind, location: Location) -> Self {
        Self {
            id,
            kind,
            location: RwLock::new(location),
            region: RwLock::new(None),
            disappear_at: RwLock::new(None),
        }
    }
}

/// Anything that can live in a region's entity store
pub trait Entity: Send + Sync {
    /// Access the shared entity state
    fn core(&self) -> &EntityCore;

    /// Display name (may be empty)
    fn name(&self) -> String;

    /// Snapshot sent to clients when the entity appears
    fn appearance(&self) -> EntityAppearance;

    fn id(&self) -> EntityId {
        self.core().id
    }

    fn kind(&self) -> EntityKind {
        self.core().kind
    }

    fn key(&self) -> EntityKey {
        EntityKey::new(self.kind(), self.id())
    }

    fn location(&self) -> Location {
        *self.core().location.read()
    }

    fn position(&self) -> Position {
        self.location().position()
    }

    /// Move the entity. Only the owning region's coordinates change here;
    /// moving between regions goes through remove-then-add.
    fn set_location(&self, location: Location) {
        *self.core().location.write() = location;
    }

    /// Region currently owning this entity
    fn region_id(&self) -> Option<RegionId> {
        *self.core().region.read()
    }

    /// Stamp or clear the owning region. Only the entity store calls this.
    fn set_region_id(&self, region: Option<RegionId>) {
        *self.core().region.write() = region;
    }

    /// Take ownership for `region`
    ///
    /// Fails with the current owner if another region holds the entity.
    /// Returns the previous owner on success.
    fn claim_region(&self, region: RegionId) -> Result<Option<RegionId>, RegionId> {
        let mut owner = self.core().region.write();
        match *owner {
            Some(other) if other != region => Err(other),
            previous => {
                *owner = Some(region);
                Ok(previous)
            }
        }
    }

    /// Drop ownership if `region` still holds the entity
    fn release_region(&self, region: RegionId) {
        let mut owner = self.core().region.write();
        if *owner == Some(region) {
            *owner = None;
        }
    }

    /// Time at which the entity is removed automatically
    fn disappear_at(&self) -> Option<DateTime<Utc>> {
        *self.core().disappear_at.read()
    }

    fn set_disappear_at(&self, at: Option<DateTime<Utc>>) {
        *self.core().disappear_at.write() = at;
    }

    /// Check whether the entity's expiry timestamp has passed
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.disappear_at().map(|at| at < now).unwrap_or(false)
    }
}

/// Snapshot of an entity for appear notifications
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityAppearance {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    pub location: Location,
    /// Race for creatures, class for props and items
    pub class_id: u32,
    /// Prop state, empty otherwise
    pub state: String,
}

/// Type-erased, identity-compared entity handle
#[derive(Clone)]
pub enum EntityHandle {
    Creature(Arc<Creature>),
    Prop(Arc<Prop>),
    Item(Arc<Item>),
}

impl EntityHandle {
    fn entity(&self) -> &dyn Entity {
        match self {
            EntityHandle::Creature(c) => c.as_ref(),
            EntityHandle::Prop(p) => p.as_ref(),
            EntityHandle::Item(i) => i.as_ref(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.entity().id()
    }

    pub fn kind(&self) -> EntityKind {
        self.entity().kind()
    }

    pub fn key(&self) -> EntityKey {
        self.entity().key()
    }

    pub fn position(&self) -> Position {
        self.entity().position()
    }

    pub fn appearance(&self) -> EntityAppearance {
        self.entity().appearance()
    }

    pub fn as_creature(&self) -> Option<&Arc<Creature>> {
        match self {
            EntityHandle::Creature(c) => Some(c),
            _ => None,
        }
    }
}

impl PartialEq for EntityHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for EntityHandle {}

impl Hash for EntityHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl std::fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(0x{:016X})", self.kind(), self.id())
    }
}

/// Monotonic id allocator for one id range
#[derive(Debug)]
pub struct EntityIdPool {
    next: AtomicU64,
}

impl EntityIdPool {
    pub fn new(start: EntityId) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    pub fn players() -> Self {
        Self::new(PLAYER_ID_START)
    }

    pub fn npcs() -> Self {
        Self::new(NPC_ID_START)
    }

    pub fn items() -> Self {
        Self::new(ITEM_ID_START)
    }

    pub fn props() -> Self {
        Self::new(PROP_ID_START)
    }

    /// Allocate the next id; ids are never reused
    pub fn next(&self) -> EntityId {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}
