//! Broadcast registry
//!
//! Sessions attached to a region. A session is attached while the creature
//! it actively controls is in the region.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::net::message::Notification;
use crate::net::session::{ClientSession, SessionId};

#[derive(Default)]
pub struct BroadcastRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<ClientSession>>>,
}

impl BroadcastRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, session: Arc<ClientSession>) {
        trace!(session_id = session.id, "Session subscribed");
        self.sessions.write().insert(session.id, session);
    }

    pub fn unsubscribe(&self, session_id: SessionId) -> bool {
        trace!(session_id = session_id, "Session unsubscribed");
        self.sessions.write().remove(&session_id).is_some()
    }

    pub fn is_subscribed(&self, session_id: SessionId) -> bool {
        self.sessions.read().contains_key(&session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Snapshot of the attached sessions
    pub fn sessions(&self) -> Vec<Arc<ClientSession>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Send to every attached session
    pub fn broadcast_all(&self, notification: &Notification) {
        for session in self.sessions() {
            session.send(notification.clone());
        }
    }

    /// Send to the attached sessions accepted by `filter`
    ///
    /// The filter runs after the registry lock is released.
    pub fn broadcast_where(
        &self,
        notification: &Notification,
        filter: impl Fn(&ClientSession) -> bool,
    ) -> usize {
        let mut sent = 0;
        for session in self.sessions() {
            if filter(&session) {
                session.send(notification.clone());
                sent += 1;
            }
        }
        sent
    }
}
