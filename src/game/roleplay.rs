//! Role-playing sessions
//!
//! A player (the controller) temporarily drives a server-owned NPC (the
//! actor) through its own client connection:
//!
//! ```text
//! Idle -> PendingSecondaryLogin -> Active -> PendingTermination -> Idle
//! ```
//!
//! Transitions of one controller are serialized by its movement-intent lock.
//! The controller/actor back-references are only written here, with both
//! link locks taken in entity-id order.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::creature::{Creature, CreatureStates, RolePlayLink};
use super::entity::Entity;
use super::position::Location;
use super::world::World;
use crate::error::RolePlayError;
use crate::net::message::Notification;
use crate::net::session::ClientSession;

/// Role-play session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolePlayState {
    /// No actor involved
    Idle,
    /// Actor placed and announced, client not switched yet
    PendingSecondaryLogin,
    /// Controller's client drives the actor
    Active,
    /// Tearing the binding down
    PendingTermination,
}

struct SessionInner {
    state: RolePlayState,
    actor: Option<Arc<Creature>>,
    placement: Option<Location>,
    restore: Option<Location>,
}

/// One controller's substitution lifecycle
pub struct RolePlayingSession {
    world: Arc<World>,
    controller: Arc<Creature>,
    inner: Mutex<SessionInner>,
}

impl RolePlayingSession {
    /// Start tracking role-play for a connected player
    pub fn new(world: Arc<World>, controller: Arc<Creature>) -> Result<Self, RolePlayError> {
        if !controller.is_player() || !controller.client().is_connected() {
            return Err(RolePlayError::NotAPlayer(controller.id()));
        }

        Ok(Self {
            world,
            controller,
            inner: Mutex::new(SessionInner {
                state: RolePlayState::Idle,
                actor: None,
                placement: None,
                restore: None,
            }),
        })
    }

    pub fn controller(&self) -> &Arc<Creature> {
        &self.controller
    }

    pub fn state(&self) -> RolePlayState {
        self.inner.lock().state
    }

    /// Check whether the controller currently drives the actor
    pub fn is_active(&self) -> bool {
        self.state() == RolePlayState::Active
    }

    /// Actor of a pending or active session
    pub fn bound_actor(&self) -> Option<Arc<Creature>> {
        self.inner.lock().actor.clone()
    }

    /// Location the controller returns to on `end`
    pub fn restore_location(&self) -> Option<Location> {
        self.inner.lock().restore
    }

    /// Place `actor` at `location` and ask the client for a secondary login
    pub fn begin_secondary_login(
        &self,
        actor: Arc<Creature>,
        location: Location,
    ) -> Result<(), RolePlayError> {
        let _movement = self.controller.movement();
        let mut inner = self.inner.lock();

        let controller_id = self.controller.id();
        if inner.state != RolePlayState::Idle {
            return Err(RolePlayError::AlreadySubstituting(controller_id));
        }
        if let Some(bound) = actor.controller() {
            if bound != controller_id {
                return Err(RolePlayError::ActorAlreadyBound {
                    actor: actor.id(),
                    controller: bound,
                });
            }
        }
        if actor.client().is_connected() {
            return Err(RolePlayError::ActorAlreadyConnected(actor.id()));
        }
        if !self.world.has_region(location.region_id) {
            self.controller.client().send(Notification::ServerMessage(
                "Secondary login failed, region doesn't exist.".to_string(),
            ));
            error!(
                controller_id = controller_id,
                region_id = location.region_id,
                "Secondary login into unknown region"
            );
            return Err(RolePlayError::InvalidZone(location.region_id));
        }

        debug!(actor_id = actor.id(), name = %actor.name(), "Logging in as actor");

        if actor.region_id().is_none() {
            actor.set_location(location);
        }
        actor.activate(CreatureStates::INSTANT_NPC | CreatureStates::ENABLE_COMMON_PVP);

        let session = self.controller.client();
        session.add_creature(actor.id());
        session.send(Notification::SecondaryLoginRequested {
            actor: actor.id(),
            host: self.world.channel_host().to_string(),
            port: self.world.channel_port(),
        });
        session.send(Notification::PetRegistered {
            controller: controller_id,
            actor: actor.id(),
        });

        inner.state = RolePlayState::PendingSecondaryLogin;
        inner.actor = Some(actor);
        inner.placement = Some(location);
        Ok(())
    }

    /// Drop a pending secondary login without switching the client
    pub fn abort_secondary_login(&self) -> Result<(), RolePlayError> {
        let _movement = self.controller.movement();
        let mut inner = self.inner.lock();

        if inner.state != RolePlayState::PendingSecondaryLogin {
            return Err(RolePlayError::NoActiveSession(self.controller.id()));
        }

        if let Some(actor) = inner.actor.take() {
            let session = self.controller.client();
            session.remove_creature(actor.id());
            session.send(Notification::PetUnregistered {
                controller: self.controller.id(),
                actor: actor.id(),
            });
            debug!(actor_id = actor.id(), "Secondary login aborted");
        }

        inner.state = RolePlayState::Idle;
        inner.placement = None;
        Ok(())
    }

    /// Switch the controller's client over to the actor
    ///
    /// With `hide` the controller's own creature leaves its region until
    /// `end`.
    pub fn start_control(&self, hide: bool) -> Result<(), RolePlayError> {
        let mut movement = self.controller.movement();
        let mut inner = self.inner.lock();

        let controller_id = self.controller.id();
        match inner.state {
            RolePlayState::PendingSecondaryLogin => {}
            RolePlayState::Idle => return Err(RolePlayError::NoActiveSession(controller_id)),
            _ => return Err(RolePlayError::AlreadySubstituting(controller_id)),
        }
        let actor = inner
            .actor
            .clone()
            .ok_or(RolePlayError::NoActiveSession(controller_id))?;

        let target = inner.placement.unwrap_or_else(|| actor.location());
        let target_region = self
            .world
            .get_region(target.region_id)
            .ok_or(RolePlayError::InvalidZone(target.region_id))?;

        self.bind(&actor)?;

        let saved = self.controller.location();
        let session = self.controller.client();
        let home = self.controller.region_id().and_then(|id| self.world.get_region(id));

        let mut hidden = false;
        if hide {
            if let Some(region) = &home {
                self.controller.role_play_link().write().hidden = true;
                region.refresh_visibility(&self.controller);
                region.remove_creature(controller_id);
                hidden = true;
            }
        }

        session.switch_controlled_creature(actor.id());
        actor.set_client(session.clone());

        if let Err(e) = self.world.move_creature(&actor, target) {
            error!(actor_id = actor.id(), error = %e, "Failed to place actor");
            actor.set_client(Arc::new(ClientSession::new(
                self.world.transports().create_disconnected(),
            )));
            session.switch_controlled_creature(controller_id);
            if hidden {
                self.controller.role_play_link().write().hidden = false;
                if let Some(region) = &home {
                    if let Err(e) = region.add_creature(self.controller.clone()) {
                        error!(controller_id = controller_id, error = %e, "Failed to restore controller");
                    }
                }
            }
            self.unbind(&actor);
            return Err(e.into());
        }
        target_region.clients().subscribe(session.clone());

        // The client's view moves with it
        hand_over_view(&self.controller, &actor);
        actor.set_watching(true);
        movement.lock();

        session.send(Notification::StartRolePlay {
            controller: controller_id,
            actor: actor.id(),
        });
        session.send(Notification::EnterRegion {
            creature: actor.id(),
            location: saved,
        });

        inner.state = RolePlayState::Active;
        inner.placement = None;
        inner.restore = Some(saved);

        info!(
            controller_id = controller_id,
            actor_id = actor.id(),
            hidden = hidden,
            "Role-play started"
        );
        Ok(())
    }

    /// Override where the controller returns to on `end`
    pub fn set_restore_location(&self, location: Location) -> Result<(), RolePlayError> {
        let mut inner = self.inner.lock();
        if inner.state != RolePlayState::Active {
            return Err(RolePlayError::NoActiveSession(self.controller.id()));
        }
        inner.restore = Some(location);
        Ok(())
    }

    /// Hand the client back to the controller and dispose of the actor
    pub fn end(&self) -> Result<(), RolePlayError> {
        let mut movement = self.controller.movement();
        let mut inner = self.inner.lock();

        let controller_id = self.controller.id();
        if inner.state != RolePlayState::Active {
            return Err(RolePlayError::NoActiveSession(controller_id));
        }
        let actor = inner
            .actor
            .take()
            .ok_or(RolePlayError::NoActiveSession(controller_id))?;
        inner.state = RolePlayState::PendingTermination;

        let hidden = self.controller.is_role_play_hidden();
        let restore = inner.restore.take().unwrap_or_else(|| self.controller.location());
        let session = self.controller.client();

        actor.set_interaction(None);

        session.send(Notification::EndRolePlay {
            controller: controller_id,
            actor: actor.id(),
        });
        session.switch_controlled_creature(controller_id);
        movement.unlock();

        session.remove_creature(actor.id());
        hand_over_view(&actor, &self.controller);
        let last_location = actor.location();
        if let Some(region) = actor.region_id().and_then(|id| self.world.get_region(id)) {
            region.remove_creature(actor.id());
            if region.get_creature(controller_id).is_none() {
                region.clients().unsubscribe(session.id);
            }
        }
        self.dispose_actor(&actor);

        session.send(Notification::PetUnregistered {
            controller: controller_id,
            actor: actor.id(),
        });
        session.send(Notification::EntityDisappeared(actor.key()));

        self.unbind(&actor);

        if hidden || restore != self.controller.location() {
            self.return_controller(restore, last_location);
        }

        inner.state = RolePlayState::Idle;
        info!(controller_id = controller_id, actor_id = actor.id(), "Role-play ended");
        Ok(())
    }

    /// Warp the controller back, falling through to the actor's last spot and
    /// then the world fallback while it is left outside every region
    fn return_controller(&self, restore: Location, last_location: Location) {
        let controller_id = self.controller.id();
        let candidates = [restore, last_location, self.world.settings.fallback_location];

        for (attempt, location) in candidates.into_iter().enumerate() {
            match self.world.warp(&self.controller, location) {
                Ok(()) => {
                    if attempt > 0 {
                        warn!(
                            controller_id = controller_id,
                            location = %location,
                            "Controller returned to a fallback location"
                        );
                    }
                    return;
                }
                Err(e) => {
                    warn!(
                        controller_id = controller_id,
                        location = %location,
                        error = %e,
                        "Failed to return controller after role-play"
                    );
                    if self.controller.region_id().is_some() {
                        return;
                    }
                }
            }
        }
        error!(controller_id = controller_id, "Controller left outside every region");
    }

    /// Give the actor a killed placeholder client
    fn dispose_actor(&self, actor: &Creature) {
        actor.set_watching(false);
        actor.visible.lock().clear();
        actor.deactivate(CreatureStates::INSTANT_NPC);

        let placeholder = Arc::new(ClientSession::new(self.world.transports().create_disconnected()));
        placeholder.kill();
        actor.set_client(placeholder);
    }

    fn bind(&self, actor: &Creature) -> Result<(), RolePlayError> {
        let controller_id = self.controller.id();
        let actor_id = actor.id();

        self.with_links(actor, |controller_link, actor_link| {
            if let Some(bound) = actor_link.controller {
                if bound != controller_id {
                    return Err(RolePlayError::ActorAlreadyBound {
                        actor: actor_id,
                        controller: bound,
                    });
                }
            }
            if controller_link.actor.is_some() {
                return Err(RolePlayError::AlreadySubstituting(controller_id));
            }

            actor_link.controller = Some(controller_id);
            controller_link.actor = Some(actor_id);
            Ok(())
        })
    }

    fn unbind(&self, actor: &Creature) {
        if self.controller.id() == actor.id() {
            *actor.role_play_link().write() = RolePlayLink::default();
            return;
        }
        self.lock_links(actor, |controller_link, actor_link| {
            *controller_link = RolePlayLink::default();
            actor_link.controller = None;
        });
    }

    fn with_links<R>(
        &self,
        actor: &Creature,
        f: impl FnOnce(&mut RolePlayLink, &mut RolePlayLink) -> Result<R, RolePlayError>,
    ) -> Result<R, RolePlayError> {
        if self.controller.id() == actor.id() {
            return Err(RolePlayError::AlreadySubstituting(self.controller.id()));
        }
        self.lock_links(actor, f)
    }

    /// Lock both back-references, lower entity id first
    ///
    /// Callers must not pass the controller itself as the actor.
    fn lock_links<R>(&self, actor: &Creature, f: impl FnOnce(&mut RolePlayLink, &mut RolePlayLink) -> R) -> R {
        let controller: &Creature = &self.controller;
        if controller.id() < actor.id() {
            let mut controller_link = controller.role_play_link().write();
            let mut actor_link = actor.role_play_link().write();
            f(&mut controller_link, &mut actor_link)
        } else {
            let mut actor_link = actor.role_play_link().write();
            let mut controller_link = controller.role_play_link().write();
            f(&mut controller_link, &mut actor_link)
        }
    }
}

/// Move the tracked visible set from one creature to the other
///
/// A creature never tracks itself, so the receiver's own key is dropped.
fn hand_over_view(from: &Creature, to: &Creature) {
    let mut view = std::mem::take(&mut *from.visible.lock());
    view.remove(&to.key());
    *to.visible.lock() = view;
}

impl std::fmt::Debug for RolePlayingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("RolePlayingSession")
            .field("controller", &self.controller.id())
            .field("state", &inner.state)
            .field("actor", &inner.actor.as_ref().map(|a| a.id()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AreaData, GameData, RegionInfoData};
    use crate::game::entity::{EntityId, NPC_ID_START, PLAYER_ID_START};
    use crate::game::item::Item;
    use crate::game::world::WorldSettings;
    use crate::net::transport::ChannelTransport;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn region(id: i32) -> RegionInfoData {
        RegionInfoData {
            id,
            name: format!("Region{}", id),
            areas: vec![AreaData {
                id: 1,
                name: String::new(),
                x1: 0,
                y1: 0,
                x2: 10000,
                y2: 10000,
                props: vec![],
                events: vec![],
            }],
            collisions: vec![],
        }
    }

    fn world() -> Arc<World> {
        world_with(WorldSettings::default())
    }

    fn world_with(settings: WorldSettings) -> Arc<World> {
        let data = GameData::default().with_region(region(1)).with_region(region(2));
        let world = World::with_data(settings, Arc::new(data));
        world.load_regions().unwrap();
        Arc::new(world)
    }

    fn appearances_of(sent: &[Notification], id: EntityId) -> usize {
        sent.iter()
            .map(|n| match n {
                Notification::EntitiesAppeared(list) => list.iter().filter(|e| e.id == id).count(),
                _ => 0,
            })
            .sum()
    }

    fn told_disappeared(sent: &[Notification], id: EntityId) -> bool {
        sent.iter().any(|n| match n {
            Notification::EntitiesDisappeared(keys) => keys.iter().any(|k| k.id == id),
            Notification::EntityDisappeared(key) => key.id == id,
            _ => false,
        })
    }

    fn player(world: &World, id: EntityId, at: Location) -> (Arc<Creature>, UnboundedReceiver<Notification>) {
        let (transport, rx) = ChannelTransport::new();
        let session = Arc::new(ClientSession::new(Arc::new(transport)));
        let creature = Arc::new(Creature::player(id, "Controller", at, session));
        world.get_region(at.region_id).unwrap().add_creature(creature.clone()).unwrap();
        (creature, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    #[test]
    fn test_npc_cannot_control() {
        let world = world();
        let npc = Arc::new(Creature::npc(NPC_ID_START, "Npc", Location::new(1, 0, 0)));
        let err = RolePlayingSession::new(world, npc).unwrap_err();
        assert_eq!(err, RolePlayError::NotAPlayer(NPC_ID_START));
    }

    #[test]
    fn test_begin_announces_actor() {
        let world = world();
        let (controller, mut rx) = player(&world, PLAYER_ID_START, Location::new(1, 100, 100));
        let session = RolePlayingSession::new(world.clone(), controller.clone()).unwrap();
        let actor = Arc::new(Creature::npc(NPC_ID_START, "Actor", Location::new(1, 0, 0)));
        drain(&mut rx);

        session.begin_secondary_login(actor.clone(), Location::new(2, 500, 500)).unwrap();

        assert_eq!(session.state(), RolePlayState::PendingSecondaryLogin);
        assert_eq!(actor.location(), Location::new(2, 500, 500));
        assert!(actor.has_state(CreatureStates::INSTANT_NPC | CreatureStates::ENABLE_COMMON_PVP));
        assert!(controller.client().has_creature(actor.id()));

        let sent = drain(&mut rx);
        assert_eq!(sent[0].name(), "SecondaryLoginRequested");
        assert_eq!(sent[1].name(), "PetRegistered");

        assert_eq!(
            session.begin_secondary_login(actor, Location::new(2, 0, 0)).unwrap_err(),
            RolePlayError::AlreadySubstituting(controller.id())
        );
    }

    #[test]
    fn test_begin_rejects_connected_actor() {
        let world = world();
        let (controller, _rx) = player(&world, PLAYER_ID_START, Location::new(1, 0, 0));
        let (other, _other_rx) = player(&world, PLAYER_ID_START + 1, Location::new(1, 0, 0));
        let session = RolePlayingSession::new(world, controller).unwrap();

        assert_eq!(
            session.begin_secondary_login(other.clone(), Location::new(1, 0, 0)).unwrap_err(),
            RolePlayError::ActorAlreadyConnected(other.id())
        );
        assert_eq!(session.state(), RolePlayState::Idle);
    }

    #[test]
    fn test_begin_rejects_unknown_region() {
        let world = world();
        let (controller, _rx) = player(&world, PLAYER_ID_START, Location::new(1, 0, 0));
        let session = RolePlayingSession::new(world, controller).unwrap();
        let actor = Arc::new(Creature::npc(NPC_ID_START, "Actor", Location::new(1, 0, 0)));

        assert_eq!(
            session.begin_secondary_login(actor, Location::new(99, 0, 0)).unwrap_err(),
            RolePlayError::InvalidZone(99)
        );
    }

    #[test]
    fn test_out_of_order_calls() {
        let world = world();
        let (controller, _rx) = player(&world, PLAYER_ID_START, Location::new(1, 0, 0));
        let session = RolePlayingSession::new(world, controller.clone()).unwrap();
        let id = controller.id();

        assert_eq!(session.start_control(false).unwrap_err(), RolePlayError::NoActiveSession(id));
        assert_eq!(session.end().unwrap_err(), RolePlayError::NoActiveSession(id));
        assert_eq!(session.abort_secondary_login().unwrap_err(), RolePlayError::NoActiveSession(id));
        assert_eq!(
            session.set_restore_location(Location::new(1, 0, 0)).unwrap_err(),
            RolePlayError::NoActiveSession(id)
        );
    }

    #[test]
    fn test_abort_returns_to_idle() {
        let world = world();
        let (controller, mut rx) = player(&world, PLAYER_ID_START, Location::new(1, 0, 0));
        let session = RolePlayingSession::new(world, controller.clone()).unwrap();
        let actor = Arc::new(Creature::npc(NPC_ID_START, "Actor", Location::new(1, 0, 0)));

        session.begin_secondary_login(actor.clone(), Location::new(1, 10, 10)).unwrap();
        drain(&mut rx);
        session.abort_secondary_login().unwrap();

        assert_eq!(session.state(), RolePlayState::Idle);
        assert!(session.bound_actor().is_none());
        assert!(!controller.client().has_creature(actor.id()));
        assert_eq!(drain(&mut rx)[0].name(), "PetUnregistered");
    }

    #[test]
    fn test_start_control_visible_body() {
        let world = world();
        let at = Location::new(1, 100, 100);
        let (controller, mut rx) = player(&world, PLAYER_ID_START, at);
        let session = RolePlayingSession::new(world.clone(), controller.clone()).unwrap();
        let actor = Arc::new(Creature::npc(NPC_ID_START, "Actor", Location::new(1, 0, 0)));

        session.begin_secondary_login(actor.clone(), Location::new(2, 300, 300)).unwrap();
        drain(&mut rx);
        session.start_control(false).unwrap();

        assert!(session.is_active());
        assert_eq!(controller.role_play_actor(), Some(actor.id()));
        assert_eq!(actor.controller(), Some(controller.id()));
        assert!(!controller.is_role_play_hidden());
        assert!(controller.is_movement_locked());
        assert!(!controller.queue_move(crate::game::position::Position::new(1, 1)));

        let client = controller.client();
        assert_eq!(client.controlling(), Some(actor.id()));
        assert!(world.get_region(1).unwrap().get_creature(controller.id()).is_some());
        assert!(world.get_region(2).unwrap().get_creature(actor.id()).is_some());
        assert!(world.get_region(2).unwrap().clients().is_subscribed(client.id));

        let sent = drain(&mut rx);
        assert!(sent.contains(&Notification::StartRolePlay {
            controller: controller.id(),
            actor: actor.id(),
        }));
        assert!(sent.contains(&Notification::EnterRegion {
            creature: actor.id(),
            location: at,
        }));
    }

    #[test]
    fn test_hidden_controller_loses_view() {
        let world = world();
        let at = Location::new(1, 100, 100);
        let (controller, mut rx) = player(&world, PLAYER_ID_START, at);
        let region = world.get_region(1).unwrap();
        region
            .add_item(Arc::new(Item::new(crate::game::entity::ITEM_ID_START, 1, 1, at)))
            .unwrap();
        region.refresh_visibility(&controller);
        assert_eq!(controller.visible_entities().len(), 1);

        let session = RolePlayingSession::new(world.clone(), controller.clone()).unwrap();
        let actor = Arc::new(Creature::npc(NPC_ID_START, "Actor", Location::new(1, 0, 0)));
        session.begin_secondary_login(actor, Location::new(1, 200, 200)).unwrap();
        drain(&mut rx);
        session.start_control(true).unwrap();

        assert!(controller.is_role_play_hidden());
        assert!(controller.visible_entities().is_empty());
        assert!(region.get_creature(controller.id()).is_none());
        assert!(drain(&mut rx).iter().any(|n| n.name() == "EntitiesDisappeared"));
    }

    #[test]
    fn test_end_restores_controller() {
        let world = world();
        let at = Location::new(1, 100, 100);
        let (controller, mut rx) = player(&world, PLAYER_ID_START, at);
        let session = RolePlayingSession::new(world.clone(), controller.clone()).unwrap();
        let actor = Arc::new(Creature::npc(NPC_ID_START, "Actor", Location::new(1, 0, 0)));

        session.begin_secondary_login(actor.clone(), Location::new(2, 300, 300)).unwrap();
        session.start_control(true).unwrap();
        actor.set_interaction(Some(NPC_ID_START + 5));
        drain(&mut rx);

        session.end().unwrap();

        assert_eq!(session.state(), RolePlayState::Idle);
        assert_eq!(controller.location(), at);
        assert!(world.get_region(1).unwrap().get_creature(controller.id()).is_some());
        assert!(world.get_region(2).unwrap().get_creature(actor.id()).is_none());
        assert!(!world.get_region(2).unwrap().clients().is_subscribed(controller.client().id));
        assert!(!actor.client().is_connected());
        assert_eq!(actor.interaction(), None);
        assert_eq!(actor.controller(), None);
        assert_eq!(controller.role_play(), RolePlayLink::default());
        assert!(!controller.is_movement_locked());
        assert_eq!(controller.client().controlling(), Some(controller.id()));

        let names: Vec<&str> = drain(&mut rx).iter().map(|n| n.name()).collect();
        assert_eq!(names[0], "EndRolePlay");
        assert!(names.contains(&"PetUnregistered"));
        assert!(names.contains(&"EnterRegion"));
    }

    #[test]
    fn test_restore_location_override() {
        let world = world();
        let (controller, _rx) = player(&world, PLAYER_ID_START, Location::new(1, 100, 100));
        let session = RolePlayingSession::new(world.clone(), controller.clone()).unwrap();
        let actor = Arc::new(Creature::npc(NPC_ID_START, "Actor", Location::new(1, 0, 0)));

        session.begin_secondary_login(actor, Location::new(1, 300, 300)).unwrap();
        session.start_control(false).unwrap();
        session.set_restore_location(Location::new(2, 42, 42)).unwrap();
        session.end().unwrap();

        assert_eq!(controller.location(), Location::new(2, 42, 42));
        assert!(world.get_region(2).unwrap().get_creature(controller.id()).is_some());
        assert!(world.get_region(1).unwrap().get_creature(controller.id()).is_none());
    }

    #[test]
    fn test_second_controller_cannot_take_actor() {
        let world = world();
        let (a, _rx_a) = player(&world, PLAYER_ID_START, Location::new(1, 0, 0));
        let (b, _rx_b) = player(&world, PLAYER_ID_START + 1, Location::new(1, 0, 0));
        let actor = Arc::new(Creature::npc(NPC_ID_START, "Actor", Location::new(1, 0, 0)));

        let session_a = RolePlayingSession::new(world.clone(), a.clone()).unwrap();
        let session_b = RolePlayingSession::new(world.clone(), b.clone()).unwrap();

        session_a.begin_secondary_login(actor.clone(), Location::new(1, 50, 50)).unwrap();
        session_b.begin_secondary_login(actor.clone(), Location::new(1, 50, 50)).unwrap();
        session_a.start_control(false).unwrap();

        assert_eq!(
            session_b.start_control(false).unwrap_err(),
            RolePlayError::ActorAlreadyBound {
                actor: actor.id(),
                controller: a.id(),
            }
        );
        assert_eq!(actor.controller(), Some(a.id()));
        assert_eq!(a.role_play_actor(), Some(actor.id()));
        assert_eq!(b.role_play_actor(), None);
        assert_eq!(session_b.state(), RolePlayState::PendingSecondaryLogin);
    }

    #[test]
    fn test_client_follows_only_the_driven_view() {
        let world = world();
        let (controller, mut rx) = player(&world, PLAYER_ID_START, Location::new(1, 0, 0));
        let region = world.get_region(1).unwrap();
        let watched = Arc::new(Creature::npc(NPC_ID_START + 1, "Watched", Location::new(1, 2500, 0)));
        region.add_creature(watched.clone()).unwrap();

        let session = RolePlayingSession::new(world.clone(), controller.clone()).unwrap();
        let actor = Arc::new(Creature::npc(NPC_ID_START, "Actor", Location::new(1, 0, 0)));
        session.begin_secondary_login(actor.clone(), Location::new(1, 3000, 0)).unwrap();
        session.start_control(false).unwrap();
        drain(&mut rx);

        world.process_tick(chrono::Utc::now());
        let sent = drain(&mut rx);
        assert_eq!(appearances_of(&sent, watched.id()), 1);
        assert!(actor.visible_entities().contains(&watched.key()));

        // Out of the controller's range, still in the actor's
        watched.set_location(Location::new(1, 5500, 0));
        world.process_tick(chrono::Utc::now());
        let sent = drain(&mut rx);
        assert!(actor.visible_entities().contains(&watched.key()));
        assert!(!told_disappeared(&sent, watched.id()));
        assert_eq!(appearances_of(&sent, watched.id()), 0);
    }

    #[test]
    fn test_view_returns_to_controller() {
        let world = world();
        let (controller, mut rx) = player(&world, PLAYER_ID_START, Location::new(1, 0, 0));
        let region = world.get_region(1).unwrap();
        let watched = Arc::new(Creature::npc(NPC_ID_START + 1, "Watched", Location::new(1, 500, 0)));
        region.add_creature(watched.clone()).unwrap();

        region.refresh_visibility(&controller);
        assert!(controller.visible_entities().contains(&watched.key()));

        let session = RolePlayingSession::new(world.clone(), controller.clone()).unwrap();
        let actor = Arc::new(Creature::npc(NPC_ID_START, "Actor", Location::new(1, 0, 0)));
        session.begin_secondary_login(actor.clone(), Location::new(1, 600, 0)).unwrap();
        session.start_control(false).unwrap();
        assert!(controller.visible_entities().is_empty());
        assert!(actor.visible_entities().contains(&watched.key()));

        drain(&mut rx);
        world.process_tick(chrono::Utc::now());
        assert_eq!(appearances_of(&drain(&mut rx), watched.id()), 0);

        session.end().unwrap();
        assert!(controller.visible_entities().contains(&watched.key()));
        assert!(actor.visible_entities().is_empty());

        drain(&mut rx);
        world.process_tick(chrono::Utc::now());
        let sent = drain(&mut rx);
        assert_eq!(appearances_of(&sent, watched.id()), 0);
        assert!(!told_disappeared(&sent, watched.id()));
    }

    #[test]
    fn test_end_after_restore_region_removed() {
        let world = world();
        let dynamic = world.create_dynamic_region(2, None).unwrap();
        let home = Location::new(dynamic.id(), 100, 100);
        let (controller, _rx) = player(&world, PLAYER_ID_START, home);

        let session = RolePlayingSession::new(world.clone(), controller.clone()).unwrap();
        let actor = Arc::new(Creature::npc(NPC_ID_START, "Actor", Location::new(1, 0, 0)));
        session.begin_secondary_login(actor, Location::new(2, 300, 300)).unwrap();
        session.start_control(true).unwrap();

        assert!(world.remove_dynamic_region(dynamic.id()));
        session.end().unwrap();

        assert_eq!(session.state(), RolePlayState::Idle);
        assert_eq!(controller.location(), Location::new(2, 300, 300));
        assert_eq!(controller.region_id(), Some(2));
        assert!(world.find_creature(controller.id()).is_some());
    }

    #[test]
    fn test_end_uses_world_fallback() {
        let fallback = Location::new(1, 500, 500);
        let world = world_with(WorldSettings::default().with_fallback_location(fallback));
        let dynamic = world.create_dynamic_region(2, None).unwrap();
        let (controller, _rx) = player(&world, PLAYER_ID_START, Location::new(dynamic.id(), 100, 100));

        let session = RolePlayingSession::new(world.clone(), controller.clone()).unwrap();
        let actor = Arc::new(Creature::npc(NPC_ID_START, "Actor", Location::new(1, 0, 0)));
        session
            .begin_secondary_login(actor.clone(), Location::new(dynamic.id(), 300, 300))
            .unwrap();
        session.start_control(true).unwrap();

        // Takes the actor down with it
        assert!(world.remove_dynamic_region(dynamic.id()));
        assert_eq!(actor.region_id(), None);
        session.end().unwrap();

        assert_eq!(controller.location(), fallback);
        assert_eq!(controller.region_id(), Some(1));
        assert!(world.find_creature(controller.id()).is_some());
        assert_eq!(controller.role_play(), RolePlayLink::default());
    }
}
