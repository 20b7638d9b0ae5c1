//! Props
//!
//! Props come in two flavours:
//! - Server-side props, spawned by game logic and fully owned by the server
//! - Client props, loaded from the zone data the client already knows about.
//!   These are "fixed": they can change state but never leave the region.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use super::entity::{Entity, EntityAppearance, EntityCore, EntityId, EntityKind};
use super::position::Location;

/// A prop placed in a region
#[derive(Debug)]
pub struct Prop {
    core: EntityCore,
    /// Prop class id
    pub class_id: u32,
    /// Facing, in radians
    pub direction: f32,
    pub scale: f32,
    /// Whether the server spawned this prop (as opposed to the client data)
    pub server_side: bool,
    /// Drop behaviour from the zone data, if any
    pub drop_type: Option<i32>,
    state: RwLock<String>,
    modified_client_side: AtomicBool,
}

impl Prop {
    /// Create a server-side prop
    pub fn server_side(id: EntityId, class_id: u32, location: Location) -> Self {
        Self::new(id, class_id, location, true)
    }

    /// Create a prop that mirrors one from the client's zone data
    pub fn client_side(id: EntityId, class_id: u32, location: Location) -> Self {
        Self::new(id, class_id, location, false)
    }

    fn new(id: EntityId, class_id: u32, location: Location, server_side: bool) -> Self {
        Self {
            core: EntityCore::new(id, EntityKind::Prop, location),
            class_id,
            direction: 0.0,
            scale: 1.0,
            server_side,
            drop_type: None,
            state: RwLock::new(String::new()),
            modified_client_side: AtomicBool::new(false),
        }
    }

    /// Set facing and scale
    pub fn with_transform(mut self, direction: f32, scale: f32) -> Self {
        self.direction = direction;
        self.scale = scale;
        self
    }

    pub fn with_drop_type(mut self, drop_type: Option<i32>) -> Self {
        self.drop_type = drop_type;
        self
    }

    /// Client props can't be removed from their region
    pub fn is_fixed(&self) -> bool {
        !self.server_side
    }

    pub fn state(&self) -> String {
        self.state.read().clone()
    }

    /// Change the prop's state
    ///
    /// A client prop whose state was touched has to be sent to every
    /// observer from then on, the client's copy no longer matches.
    pub fn set_state(&self, state: impl Into<String>) {
        *self.state.write() = state.into();
        if !self.server_side {
            self.modified_client_side.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_modified_client_side(&self) -> bool {
        self.modified_client_side.load(Ordering::SeqCst)
    }

    /// Props that have to be sent regardless of distance
    pub fn is_always_visible(&self) -> bool {
        self.server_side || self.is_modified_client_side()
    }
}

impl Entity for Prop {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn name(&self) -> String {
        String::new()
    }

    fn appearance(&self) -> EntityAppearance {
        EntityAppearance {
            id: self.id(),
            kind: EntityKind::Prop,
            name: String::new(),
            location: self.location(),
            class_id: self.class_id,
            state: self.state(),
        }
    }
}
