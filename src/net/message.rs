//! Outbound notification values
//!
//! The world core never encodes bytes. It builds these values and hands them
//! to a [`Transport`](super::transport::Transport), which owns the wire format.

use serde::Serialize;

use crate::game::entity::{EntityAppearance, EntityId, EntityKey};
use crate::game::position::Location;

/// A state change pushed to a client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Notification {
    /// A single entity came into view
    EntityAppeared(EntityAppearance),
    /// Several entities came into view
    EntitiesAppeared(Vec<EntityAppearance>),
    /// A single entity left view
    EntityDisappeared(EntityKey),
    /// Several entities left view
    EntitiesDisappeared(Vec<EntityKey>),
    /// A server-side prop was removed
    PropDisappeared(EntityId),
    /// A prop changed state
    PropStateChanged { prop: EntityId, state: String },
    /// Ask the client to open a second login for an actor
    SecondaryLoginRequested {
        actor: EntityId,
        host: String,
        port: u16,
    },
    /// Actor registered as a secondary creature of the controller
    PetRegistered { controller: EntityId, actor: EntityId },
    /// Actor removed from the controller's secondary creatures
    PetUnregistered { controller: EntityId, actor: EntityId },
    /// Control switched from the controller to the actor
    StartRolePlay { controller: EntityId, actor: EntityId },
    /// Control handed back to the controller
    EndRolePlay { controller: EntityId, actor: EntityId },
    /// Client has to (re)enter a region at the given location
    EnterRegion { creature: EntityId, location: Location },
    /// The creature this connection drives changed
    ControlSwitched { creature: EntityId },
    /// Plain server text
    ServerMessage(String),
}

impl Notification {
    /// Get a short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Notification::EntityAppeared(_) => "EntityAppeared",
            Notification::EntitiesAppeared(_) => "EntitiesAppeared",
            Notification::EntityDisappeared(_) => "EntityDisappeared",
            Notification::EntitiesDisappeared(_) => "EntitiesDisappeared",
            Notification::PropDisappeared(_) => "PropDisappeared",
            Notification::PropStateChanged { .. } => "PropStateChanged",
            Notification::SecondaryLoginRequested { .. } => "SecondaryLoginRequested",
            Notification::PetRegistered { .. } => "PetRegistered",
            Notification::PetUnregistered { .. } => "PetUnregistered",
            Notification::StartRolePlay { .. } => "StartRolePlay",
            Notification::EndRolePlay { .. } => "EndRolePlay",
            Notification::EnterRegion { .. } => "EnterRegion",
            Notification::ControlSwitched { .. } => "ControlSwitched",
            Notification::ServerMessage(_) => "ServerMessage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::EntityKind;

    #[test]
    fn test_serialize_tagged() {
        let n = Notification::PropStateChanged {
            prop: 5,
            state: "open".to_string(),
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "prop_state_changed");
        assert_eq!(json["data"]["state"], "open");

        let n = Notification::EntitiesDisappeared(vec![EntityKey::new(EntityKind::Item, 7)]);
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["data"][0]["id"], 7);
    }

    #[test]
    fn test_name() {
        assert_eq!(
            Notification::ServerMessage(String::new()).name(),
            "ServerMessage"
        );
    }
}
