//! Transport abstraction module
//!
//! The world talks to clients through the [`Transport`] trait:
//! - [`ChannelTransport`] queues notifications on a tokio channel for a
//!   connection task to encode and write
//! - [`DisconnectedTransport`] is the placeholder server-owned actors use
//!   while no client drives them

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::message::Notification;
use crate::game::entity::EntityId;

/// Outbound side of a client connection
pub trait Transport: Send + Sync {
    /// Queue a notification; never blocks
    fn send(&self, notification: Notification);

    /// Point the connection at a different creature
    fn switch_controlled_creature(&self, creature: EntityId);

    /// Check whether a real client is attached
    fn is_connected(&self) -> bool;

    /// Drop the connection
    fn kill(&self);
}

/// Transport backed by an unbounded tokio channel
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Notification>,
    connected: AtomicBool,
    controlled: RwLock<Option<EntityId>>,
}

impl ChannelTransport {
    /// Create a transport and the receiver its connection task drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            tx,
            connected: AtomicBool::new(true),
            controlled: RwLock::new(None),
        };
        (transport, rx)
    }

    /// Creature the connection currently drives
    pub fn controlled(&self) -> Option<EntityId> {
        *self.controlled.read()
    }
}

impl Transport for ChannelTransport {
    fn send(&self, notification: Notification) {
        if !self.is_connected() {
            trace!(kind = notification.name(), "Dropping notification for killed transport");
            return;
        }

        if self.tx.send(notification).is_err() {
            // Receiver gone, the connection task has exited
            debug!("Outbound channel closed, marking transport disconnected");
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    fn switch_controlled_creature(&self, creature: EntityId) {
        *self.controlled.write() = Some(creature);
        self.send(Notification::ControlSwitched { creature });
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn kill(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Placeholder transport for creatures no client drives
#[derive(Debug, Default)]
pub struct DisconnectedTransport;

impl Transport for DisconnectedTransport {
    fn send(&self, notification: Notification) {
        trace!(kind = notification.name(), "Discarding notification, no client attached");
    }

    fn switch_controlled_creature(&self, _creature: EntityId) {}

    fn is_connected(&self) -> bool {
        false
    }

    fn kill(&self) {}
}

/// Creates transports for the world
pub trait TransportFactory: Send + Sync {
    /// Create a placeholder transport with no client behind it
    fn create_disconnected(&self) -> Arc<dyn Transport>;
}

/// Factory handing out [`DisconnectedTransport`]s
#[derive(Debug, Default)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create_disconnected(&self) -> Arc<dyn Transport> {
        Arc::new(DisconnectedTransport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_transport_send() {
        let (transport, mut rx) = ChannelTransport::new();
        transport.send(Notification::ServerMessage("hi".to_string()));

        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::ServerMessage("hi".to_string())
        );
    }

    #[test]
    fn test_kill_stops_delivery() {
        let (transport, mut rx) = ChannelTransport::new();
        transport.kill();
        assert!(!transport.is_connected());

        transport.send(Notification::ServerMessage("lost".to_string()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_receiver_disconnects() {
        let (transport, rx) = ChannelTransport::new();
        drop(rx);

        transport.send(Notification::ServerMessage("lost".to_string()));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_switch_controlled_creature() {
        let (transport, mut rx) = ChannelTransport::new();
        transport.switch_controlled_creature(42);

        assert_eq!(transport.controlled(), Some(42));
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::ControlSwitched { creature: 42 }
        );
    }

    #[test]
    fn test_disconnected_factory() {
        let transport = DefaultTransportFactory.create_disconnected();
        assert!(!transport.is_connected());
    }
}
