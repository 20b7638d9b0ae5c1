//! Client session module
//!
//! A session is one client connection as the world sees it:
//! - The transport notifications go out on
//! - The creature the session actively drives ("controlling")
//! - Secondary creatures registered to it (pets, role-play actors)

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashSet;
use parking_lot::RwLock;
use tracing::debug;

use super::message::Notification;
use super::transport::{DisconnectedTransport, Transport};
use crate::game::entity::EntityId;

/// Unique session identifier
pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// A client's view of the world
pub struct ClientSession {
    /// Unique session identifier
    pub id: SessionId,
    transport: Arc<dyn Transport>,
    controlling: RwLock<Option<EntityId>>,
    creatures: DashSet<EntityId>,
    /// Time of session creation
    pub created_at: Instant,
}

impl ClientSession {
    /// Create a session on top of a transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst),
            transport,
            controlling: RwLock::new(None),
            creatures: DashSet::new(),
            created_at: Instant::now(),
        }
    }

    /// Create a session nobody is connected to
    pub fn disconnected() -> Self {
        Self::new(Arc::new(DisconnectedTransport))
    }

    /// Queue a notification for the client
    pub fn send(&self, notification: Notification) {
        self.transport.send(notification);
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Creature this session actively drives
    pub fn controlling(&self) -> Option<EntityId> {
        *self.controlling.read()
    }

    pub fn set_controlling(&self, creature: Option<EntityId>) {
        let old = std::mem::replace(&mut *self.controlling.write(), creature);
        debug!(
            session_id = self.id,
            old = ?old,
            new = ?creature,
            "Controlling creature changed"
        );
    }

    /// Redirect the session and its transport to another creature
    pub fn switch_controlled_creature(&self, creature: EntityId) {
        self.set_controlling(Some(creature));
        self.transport.switch_controlled_creature(creature);
    }

    /// Register a creature with this session
    pub fn add_creature(&self, creature: EntityId) {
        self.creatures.insert(creature);
    }

    /// Unregister a creature, returning whether it was registered
    pub fn remove_creature(&self, creature: EntityId) -> bool {
        self.creatures.remove(&creature).is_some()
    }

    pub fn has_creature(&self, creature: EntityId) -> bool {
        self.creatures.contains(&creature)
    }

    /// Snapshot of all registered creatures
    pub fn creatures(&self) -> HashSet<EntityId> {
        self.creatures.iter().map(|id| *id).collect()
    }

    /// Drop the underlying connection
    pub fn kill(&self) {
        debug!(session_id = self.id, "Killing session");
        self.transport.kill();
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .field("controlling", &self.controlling())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::transport::ChannelTransport;

    #[test]
    fn test_unique_ids() {
        let a = ClientSession::disconnected();
        let b = ClientSession::disconnected();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_creature_set() {
        let session = ClientSession::disconnected();
        session.add_creature(1);
        session.add_creature(2);

        assert!(session.has_creature(1));
        assert!(session.remove_creature(1));
        assert!(!session.remove_creature(1));
        assert_eq!(session.creatures(), HashSet::from([2]));
    }

    #[test]
    fn test_switch_controlled_creature() {
        let (transport, mut rx) = ChannelTransport::new();
        let session = ClientSession::new(Arc::new(transport));
        assert!(session.is_connected());

        session.switch_controlled_creature(9);
        assert_eq!(session.controlling(), Some(9));
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::ControlSwitched { creature: 9 }
        );
    }

    #[test]
    fn test_disconnected_session() {
        let session = ClientSession::disconnected();
        assert!(!session.is_connected());
        session.send(Notification::ServerMessage("void".to_string()));
    }
}
