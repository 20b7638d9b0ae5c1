//! Region module
//!
//! A region is one zone instance:
//! - Entity store (creatures, props, items)
//! - Sessions attached to it, for broadcasts
//! - Private copy of its areas, client events and collision geometry
//! - The maintenance pass that expires entities and refreshes visibility
//!
//! Dynamic regions are instanced copies of a base zone with their own id.
//! The client renumbers a dynamic copy's areas by list position, so client
//! prop and event ids are rewritten the same way here.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use super::broadcast::BroadcastRegistry;
use super::collision::RegionCollisions;
use super::creature::{Creature, CreatureStates};
use super::entity::{Entity, EntityHandle, EntityId, RegionId, NPC_ID_START};
use super::item::Item;
use super::position::{Location, Position};
use super::prop::Prop;
use super::store::{EntityStore, PropScope};
use super::visibility::{look_around, VisibilityDelta};
use crate::config::DEFAULT_VISIBLE_RANGE;
use crate::data::{AreaData, GameData};
use crate::error::RegionError;
use crate::net::message::Notification;

/// Bits of a client entity id that carry region and area
const CLIENT_ID_LOCATION_MASK: u64 = 0x0000_FFFF_FFFF_0000;

/// Notified when a spawn-tagged creature expires
pub trait SpawnRegistry: Send + Sync {
    fn respawn(&self, spawn_id: u32, count: usize);
}

/// Spawn registry that never respawns anything
#[derive(Debug, Default)]
pub struct NoRespawn;

impl SpawnRegistry for NoRespawn {
    fn respawn(&self, _spawn_id: u32, _count: usize) {}
}

/// Collaborators and settings every region is built with
#[derive(Clone)]
pub struct RegionContext {
    pub visible_range: i32,
    pub spawner: Arc<dyn SpawnRegistry>,
}

impl Default for RegionContext {
    fn default() -> Self {
        Self {
            visible_range: DEFAULT_VISIBLE_RANGE,
            spawner: Arc::new(NoRespawn),
        }
    }
}

/// Client event copied into a region, with its region-local id
#[derive(Debug, Clone, PartialEq)]
pub struct RegionEvent {
    pub id: EntityId,
    pub kind: i32,
    pub location: Location,
}

/// Rewrite a client entity id for the region and area it lives in
pub fn remap_client_id(id: EntityId, region_id: RegionId, area_id: u32) -> EntityId {
    let mut id = id & !CLIENT_ID_LOCATION_MASK;
    id |= (region_id as u32 as u64) << 32;
    id |= (area_id as u64 & 0xFFFF) << 16;
    id
}

/// Area id encoded in a client entity id
pub fn area_id_of(id: EntityId) -> u32 {
    ((id >> 16) & 0xFFFF) as u32
}

pub struct Region {
    id: RegionId,
    base_id: RegionId,
    name: String,
    variation: Option<String>,
    areas: Vec<AreaData>,
    events: HashMap<EntityId, RegionEvent>,
    collisions: RegionCollisions,
    store: EntityStore,
    clients: BroadcastRegistry,
    ctx: RegionContext,
}

impl Region {
    /// Create a persistent world region
    pub fn normal(data: &GameData, region_id: RegionId, ctx: RegionContext) -> Result<Self, RegionError> {
        Self::build(data, region_id, region_id, None, ctx)
    }

    /// Create an instanced copy of `base_id` under a freshly allocated id
    pub fn dynamic(
        data: &GameData,
        base_id: RegionId,
        id: RegionId,
        variation: Option<String>,
        ctx: RegionContext,
    ) -> Result<Self, RegionError> {
        Self::build(data, base_id, id, variation, ctx)
    }

    fn build(
        data: &GameData,
        base_id: RegionId,
        id: RegionId,
        variation: Option<String>,
        ctx: RegionContext,
    ) -> Result<Self, RegionError> {
        let info = data
            .region_info(base_id)
            .ok_or(RegionError::InvalidZone(base_id))?;

        let name = if id != base_id {
            format!("Dynamic{}", id)
        } else {
            info.name.clone()
        };

        let mut collisions = RegionCollisions::new();
        collisions.load(&info.collisions);

        let mut region = Self {
            id,
            base_id,
            name,
            variation,
            areas: info.areas.clone(),
            events: HashMap::new(),
            collisions,
            store: EntityStore::new(id),
            clients: BroadcastRegistry::new(),
            ctx,
        };

        region.load_props()?;
        region.load_events()?;

        info!(
            region_id = region.id,
            base_id = region.base_id,
            name = %region.name,
            areas = region.areas.len(),
            props = region.store.props.len(),
            events = region.events.len(),
            "Region loaded"
        );

        Ok(region)
    }

    fn load_props(&self) -> Result<(), RegionError> {
        for area in &self.areas {
            for data in &area.props {
                let area_id = self.local_area_id(area_id_of(data.entity_id))?;
                let id = remap_client_id(data.entity_id, self.id, area_id);

                let prop = Prop::client_side(id, data.class_id, Location::new(self.id, data.x, data.y))
                    .with_transform(data.direction, data.scale)
                    .with_drop_type(data.drop_type);

                self.store.add_prop(Arc::new(prop))?;
            }
        }
        Ok(())
    }

    fn load_events(&mut self) -> Result<(), RegionError> {
        let mut events = HashMap::new();
        for area in &self.areas {
            for data in &area.events {
                let area_id = self.local_area_id(area_id_of(data.id))?;
                let id = remap_client_id(data.id, self.id, area_id);
                events.insert(
                    id,
                    RegionEvent {
                        id,
                        kind: data.kind,
                        location: Location::new(self.id, data.x, data.y),
                    },
                );
            }
        }
        self.events = events;
        Ok(())
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    /// Id of the zone this region was built from
    pub fn base_id(&self) -> RegionId {
        self.base_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variation(&self) -> Option<&str> {
        self.variation.as_deref()
    }

    pub fn is_dynamic(&self) -> bool {
        self.id != self.base_id
    }

    pub fn visible_range(&self) -> i32 {
        self.ctx.visible_range
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Sessions attached to this region
    pub fn clients(&self) -> &BroadcastRegistry {
        &self.clients
    }

    pub fn areas(&self) -> &[AreaData] {
        &self.areas
    }

    /// Translate a source area id to the id this region uses
    ///
    /// Dynamic regions number areas by their 1-based position in the area list.
    pub fn local_area_id(&self, area_id: u32) -> Result<u32, RegionError> {
        if !self.is_dynamic() {
            return Ok(area_id);
        }

        self.areas
            .iter()
            .position(|a| a.id == area_id)
            .map(|index| index as u32 + 1)
            .ok_or(RegionError::AreaResolutionFailure {
                area_id,
                base_id: self.base_id,
            })
    }

    /// Local id of the area containing the point, 0 if none (normal regions)
    pub fn area_id_at(&self, x: i32, y: i32) -> Result<u32, RegionError> {
        let area_id = self
            .areas
            .iter()
            .filter(|a| a.contains(x, y))
            .last()
            .map(|a| a.id)
            .unwrap_or(0);

        self.local_area_id(area_id)
    }

    pub fn get_event(&self, id: EntityId) -> Option<&RegionEvent> {
        self.events.get(&id)
    }

    /// Check whether moving from `from` to `to` hits a wall
    pub fn collides(&self, from: Position, to: Position) -> bool {
        self.collisions.any(from, to)
    }

    // Creatures

    /// Add a creature and attach its session if the session drives it
    pub fn add_creature(&self, creature: Arc<Creature>) -> Result<(), RegionError> {
        self.store.add_creature(creature.clone())?;

        let client = creature.client();
        if client.controlling() == Some(creature.id()) {
            self.clients.subscribe(client);
        }

        self.broadcast_in_range(
            Notification::EntityAppeared(creature.appearance()),
            creature.as_ref(),
            self.ctx.visible_range,
            false,
        );

        if creature.id() < NPC_ID_START {
            debug!(
                region_id = self.id,
                creatures = self.store.creatures.len(),
                "Creatures currently in region"
            );
        }

        Ok(())
    }

    /// Remove a creature, detaching its session if the session drives it
    pub fn remove_creature(&self, id: EntityId) -> Option<Arc<Creature>> {
        let creature = self.store.remove_creature(id)?;
        self.after_creature_removed(&creature);
        Some(creature)
    }

    fn after_creature_removed(&self, creature: &Creature) {
        self.broadcast_in_range(
            Notification::EntityDisappeared(creature.key()),
            creature,
            self.ctx.visible_range,
            false,
        );

        let client = creature.client();
        if client.controlling() == Some(creature.id()) {
            self.clients.unsubscribe(client.id);
        }

        if creature.id() < NPC_ID_START {
            debug!(
                region_id = self.id,
                creatures = self.store.creatures.len(),
                "Creatures currently in region"
            );
        }
    }

    pub fn get_creature(&self, id: EntityId) -> Option<Arc<Creature>> {
        self.store.creatures.get(id)
    }

    /// First creature with the given name
    pub fn get_creature_by_name(&self, name: &str) -> Option<Arc<Creature>> {
        self.store.creatures.find(|c| c.name() == name)
    }

    pub fn get_npc(&self, id: EntityId) -> Option<Arc<Creature>> {
        self.get_creature(id).filter(|c| !c.is_player())
    }

    pub fn get_player(&self, name: &str) -> Option<Arc<Creature>> {
        self.store
            .creatures
            .find(|c| c.is_player() && c.name() == name)
    }

    pub fn get_players_in_range(&self, pos: Position, range: i32) -> Vec<Arc<Creature>> {
        self.store
            .creatures
            .filter(|c| c.is_player() && c.position().in_range(&pos, range))
    }

    pub fn get_all_players(&self) -> Vec<Arc<Creature>> {
        self.store.creatures.filter(|c| c.is_player())
    }

    /// Players directly controlled, pets and partners excluded
    pub fn count_players(&self) -> usize {
        self.store
            .creatures
            .count(|c| c.is_player() && c.master().is_none())
    }

    /// Visible creatures around `source`, excluding itself
    pub fn get_visible_creatures_in_range(&self, source: &dyn Entity, range: i32) -> Vec<Arc<Creature>> {
        let pos = source.position();
        let source_key = source.key();
        self.store.creatures.filter(|c| {
            c.key() != source_key && !c.is_invisible() && c.position().in_range(&pos, range)
        })
    }

    pub fn get_creatures_in_range(&self, pos: Position, range: i32) -> Vec<Arc<Creature>> {
        self.store.creatures_in_range(pos, range)
    }

    pub fn get_creatures_in_polygon(&self, points: &[Position]) -> Vec<Arc<Creature>> {
        self.store
            .creatures
            .filter(|c| c.position().in_polygon(points))
    }

    pub fn get_all_good_npcs(&self) -> Vec<Arc<Creature>> {
        self.store
            .creatures
            .filter(|c| !c.is_player() && c.has_state(CreatureStates::GOOD_NPC))
    }

    // Props

    pub fn add_prop(&self, prop: Arc<Prop>) -> Result<(), RegionError> {
        self.store.add_prop(prop.clone())?;
        self.broadcast_in_range(
            Notification::EntityAppeared(prop.appearance()),
            prop.as_ref(),
            self.ctx.visible_range,
            true,
        );
        Ok(())
    }

    /// Remove a server-side prop; client props stay and only lose their expiry
    pub fn remove_prop(&self, id: EntityId) -> Option<Arc<Prop>> {
        let prop = self.store.remove_prop(id)?;
        self.clients.broadcast_all(&Notification::PropDisappeared(prop.id()));
        Some(prop)
    }

    pub fn get_prop(&self, id: EntityId) -> Option<Arc<Prop>> {
        self.store.props.get(id)
    }

    /// Change a prop's state and tell everyone in the region
    pub fn set_prop_state(&self, id: EntityId, state: &str) -> bool {
        let Some(prop) = self.store.props.get(id) else {
            return false;
        };
        prop.set_state(state);
        self.clients.broadcast_all(&Notification::PropStateChanged {
            prop: id,
            state: state.to_string(),
        });
        true
    }

    // Items

    pub fn add_item(&self, item: Arc<Item>) -> Result<(), RegionError> {
        self.store.add_item(item.clone())?;
        self.broadcast_in_range(
            Notification::EntityAppeared(item.appearance()),
            item.as_ref(),
            self.ctx.visible_range,
            true,
        );
        Ok(())
    }

    pub fn remove_item(&self, id: EntityId) -> Option<Arc<Item>> {
        let item = self.store.remove_item(id)?;
        self.broadcast_in_range(
            Notification::EntityDisappeared(item.key()),
            item.as_ref(),
            self.ctx.visible_range,
            true,
        );
        Some(item)
    }

    pub fn get_item(&self, id: EntityId) -> Option<Arc<Item>> {
        self.store.items.get(id)
    }

    pub fn get_all_items(&self) -> Vec<Arc<Item>> {
        self.store.items.all()
    }

    /// Put an item on the floor; it disappears after its drop lifetime
    pub fn drop_item(&self, item: Arc<Item>, x: i32, y: i32) -> Result<(), RegionError> {
        item.set_location(Location::new(self.id, x, y));
        item.set_disappear_at(Some(item.drop_expiry(Utc::now())));
        self.add_item(item)
    }

    // Queries

    /// Everything within `range` of `pos`, props range-filtered too
    pub fn get_entities_in_range(&self, pos: Position, range: i32) -> Vec<EntityHandle> {
        self.store.range_query(pos, range, PropScope::InRange)
    }

    pub fn get_entities_in_polygon(&self, points: &[Position]) -> Vec<EntityHandle> {
        self.store.polygon_query(points)
    }

    /// Remove all NPCs and server-side props
    pub fn remove_scripted_entities(&self) -> usize {
        let npcs = self.store.creatures.filter(|c| !c.is_player());
        let props = self.store.props.filter(|p| p.server_side);

        let mut removed = 0;
        for npc in npcs {
            if self.remove_creature(npc.id()).is_some() {
                removed += 1;
            }
        }
        for prop in props {
            if self.remove_prop(prop.id()).is_some() {
                removed += 1;
            }
        }

        debug!(region_id = self.id, removed = removed, "Scripted entities removed");
        removed
    }

    /// Wake NPC AIs around a movement path for the travel duration
    pub fn activate_ais(&self, speed: f64, from: Position, to: Position) -> usize {
        if speed <= 0.0 {
            return 0;
        }

        let range = self.ctx.visible_range;
        let min_x = from.x.min(to.x).saturating_sub(range);
        let min_y = from.y.min(to.y).saturating_sub(range);
        let max_x = from.x.max(to.x).saturating_add(range);
        let max_y = from.y.max(to.y).saturating_add(range);

        let duration_ms = (from.distance_to(&to) / speed * 1000.0) as u64;

        let npcs = self.store.creatures.filter(|c| {
            let pos = c.position();
            !c.is_player()
                && c.ai().is_some()
                && pos.x >= min_x
                && pos.x <= max_x
                && pos.y >= min_y
                && pos.y <= max_y
        });

        for npc in &npcs {
            if let Some(ai) = npc.ai() {
                ai.activate(duration_ms);
            }
        }

        npcs.len()
    }

    // Broadcasting

    /// Send to every attached session
    pub fn broadcast(&self, notification: Notification) {
        self.clients.broadcast_all(&notification);
    }

    /// Send to sessions whose controlled creature is within `range` of `source`
    pub fn broadcast_in_range(
        &self,
        notification: Notification,
        source: &dyn Entity,
        range: i32,
        include_source: bool,
    ) -> usize {
        let origin = source.position();
        let source_id = source.id();

        self.clients.broadcast_where(&notification, |session| {
            let Some(controlling) = session.controlling() else {
                return false;
            };
            if !include_source && controlling == source_id {
                return false;
            }
            self.store
                .creatures
                .get(controlling)
                .map(|c| c.position().in_range(&origin, range))
                .unwrap_or(false)
        })
    }

    // Maintenance

    /// One maintenance pass: expire entities, then refresh visibility
    pub fn update_entities(&self, now: DateTime<Utc>) {
        self.remove_overdue_entities(now);
        self.update_visibility();
    }

    fn remove_overdue_entities(&self, now: DateTime<Utc>) {
        let expired = self.store.remove_expired(now);
        if expired.is_empty() {
            return;
        }

        debug!(region_id = self.id, count = expired.len(), "Removing expired entities");

        for creature in &expired.creatures {
            self.after_creature_removed(creature);
            if let Some(spawn_id) = creature.spawn_id() {
                self.ctx.spawner.respawn(spawn_id, 1);
            }
        }
        for prop in &expired.props {
            self.clients.broadcast_all(&Notification::PropDisappeared(prop.id()));
        }
        for item in &expired.items {
            self.broadcast_in_range(
                Notification::EntityDisappeared(item.key()),
                item.as_ref(),
                self.ctx.visible_range,
                true,
            );
        }
    }

    /// Only the creature a session is currently driving looks around, so a
    /// client never gets two views at once
    fn update_visibility(&self) {
        for creature in self
            .store
            .creatures
            .filter(|c| c.is_watching() && c.client().controlling() == Some(c.id()))
        {
            self.refresh_visibility(&creature);
        }
    }

    /// Recompute one creature's view and send the difference to its client
    pub fn refresh_visibility(&self, creature: &Creature) -> VisibilityDelta {
        let delta = look_around(creature, &self.store, self.ctx.visible_range);
        if !delta.is_empty() {
            let client = creature.client();
            for notification in delta.clone().into_notifications() {
                client.send(notification);
            }
        }
        delta
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("id", &self.id)
            .field("base_id", &self.base_id)
            .field("name", &self.name)
            .finish()
    }
}

/// Log a refused operation caused by inconsistent static data
pub(crate) fn log_area_failure(err: &RegionError) {
    if let RegionError::AreaResolutionFailure { area_id, base_id } = err {
        error!(area_id = area_id, base_id = base_id, "Area resolution failed, static data is inconsistent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    use chrono::Duration;

    use crate::data::{EventData, PropData, RegionInfoData};
    use crate::game::creature::AiController;
    use crate::game::entity::{ITEM_ID_START, PLAYER_ID_START, PROP_ID_START};
    use crate::net::session::ClientSession;
    use crate::net::transport::ChannelTransport;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn area(id: u32, x1: i32, x2: i32) -> AreaData {
        AreaData {
            id,
            name: String::new(),
            x1,
            y1: 0,
            x2,
            y2: 1000,
            props: vec![],
            events: vec![],
        }
    }

    fn data() -> GameData {
        let mut a3 = area(3, 1000, 2000);
        a3.props.push(PropData {
            entity_id: 0x00A0_0001_0003_0001,
            class_id: 100,
            x: 1500,
            y: 500,
            direction: 0.0,
            scale: 1.0,
            drop_type: None,
        });
        a3.events.push(EventData {
            id: 0x00B0_0001_0003_0002,
            kind: 1,
            x: 1500,
            y: 500,
        });

        GameData::default().with_region(RegionInfoData {
            id: 1,
            name: "Tir Chonaill".to_string(),
            areas: vec![area(7, 0, 1000), a3, area(9, 2000, 3000)],
            collisions: vec![],
        })
    }

    fn player(region: &Region, x: i32) -> (Arc<Creature>, UnboundedReceiver<Notification>) {
        let (transport, rx) = ChannelTransport::new();
        let session = Arc::new(ClientSession::new(Arc::new(transport)));
        let creature = Arc::new(Creature::player(
            PLAYER_ID_START + x as u64,
            "Player",
            Location::new(region.id(), x, 0),
            session,
        ));
        region.add_creature(creature.clone()).unwrap();
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
    fn test_unknown_region() {
        let err = Region::normal(&data(), 99, RegionContext::default()).unwrap_err();
        assert_eq!(err, RegionError::InvalidZone(99));
    }

    #[test]
    fn test_normal_region_keeps_area_ids() {
        let region = Region::normal(&data(), 1, RegionContext::default()).unwrap();
        assert!(!region.is_dynamic());
        assert_eq!(region.name(), "Tir Chonaill");
        assert_eq!(region.local_area_id(3).unwrap(), 3);
        assert_eq!(region.area_id_at(1500, 500).unwrap(), 3);
        assert_eq!(region.area_id_at(-50, 500).unwrap(), 0);

        let prop_id = remap_client_id(0x00A0_0001_0003_0001, 1, 3);
        assert_eq!(prop_id, 0x00A0_0001_0003_0001);
        assert!(region.get_prop(prop_id).unwrap().is_fixed());
    }

    #[test]
    fn test_dynamic_region_renumbers_areas() {
        let region = Region::dynamic(&data(), 1, 35001, Some("rp".to_string()), RegionContext::default()).unwrap();
        assert!(region.is_dynamic());
        assert_eq!(region.name(), "Dynamic35001");
        assert_eq!(region.variation(), Some("rp"));

        assert_eq!(region.local_area_id(7).unwrap(), 1);
        assert_eq!(region.local_area_id(3).unwrap(), 2);
        assert_eq!(region.local_area_id(9).unwrap(), 3);
        assert_eq!(
            region.local_area_id(4).unwrap_err(),
            RegionError::AreaResolutionFailure { area_id: 4, base_id: 1 }
        );
        assert!(region.area_id_at(-50, 500).is_err());

        let prop_id = remap_client_id(0x00A0_0001_0003_0001, 35001, 2);
        assert_eq!(prop_id, 0x00A0_88B9_0002_0001);
        assert_eq!(region.get_prop(prop_id).unwrap().location().region_id, 35001);

        let event_id = remap_client_id(0x00B0_0001_0003_0002, 35001, 2);
        assert!(region.get_event(event_id).is_some());
    }

    #[test]
    fn test_session_subscription() {
        let region = Region::normal(&data(), 1, RegionContext::default()).unwrap();
        let (creature, _rx) = player(&region, 0);
        let session = creature.client();
        assert!(region.clients().is_subscribed(session.id));

        // An actor the session isn't driving doesn't detach it
        let pet = Arc::new(Creature::npc(NPC_ID_START, "Pet", Location::new(1, 0, 0)));
        pet.set_client(session.clone());
        region.add_creature(pet.clone()).unwrap();
        region.remove_creature(pet.id());
        assert!(region.clients().is_subscribed(session.id));

        region.remove_creature(creature.id());
        assert!(!region.clients().is_subscribed(session.id));
    }

    #[test]
    fn test_broadcast_in_range() {
        let region = Region::normal(&data(), 1, RegionContext::default()).unwrap();
        let (near, mut near_rx) = player(&region, 0);
        let (_far, mut far_rx) = player(&region, 9000);
        drain(&mut near_rx);
        drain(&mut far_rx);

        let msg = Notification::ServerMessage("shout".to_string());
        assert_eq!(region.broadcast_in_range(msg.clone(), near.as_ref(), 3000, true), 1);
        assert_eq!(drain(&mut near_rx), vec![msg.clone()]);
        assert!(drain(&mut far_rx).is_empty());

        assert_eq!(region.broadcast_in_range(msg, near.as_ref(), 3000, false), 0);
    }

    #[test]
    fn test_prop_state_broadcast() {
        let region = Region::normal(&data(), 1, RegionContext::default()).unwrap();
        let (_p, mut rx) = player(&region, 0);
        drain(&mut rx);

        let prop_id = 0x00A0_0001_0003_0001;
        assert!(region.set_prop_state(prop_id, "open"));
        assert!(region.get_prop(prop_id).unwrap().is_modified_client_side());
        assert_eq!(
            drain(&mut rx),
            vec![Notification::PropStateChanged {
                prop: prop_id,
                state: "open".to_string()
            }]
        );
        assert!(!region.set_prop_state(1, "open"));
    }

    #[test]
    fn test_drop_item_expiry() {
        let region = Region::normal(&data(), 1, RegionContext::default()).unwrap();
        let item = Arc::new(Item::with_price(ITEM_ID_START, 2000, 1, 1200, Location::default()));
        let before = Utc::now();
        region.drop_item(item.clone(), 10, 20).unwrap();

        assert_eq!(item.location(), Location::new(1, 10, 20));
        let at = item.disappear_at().unwrap();
        assert!(at >= before + Duration::seconds(720));
        assert!(at <= Utc::now() + Duration::seconds(720));
    }

    struct CountingSpawner(AtomicUsize);

    impl SpawnRegistry for CountingSpawner {
        fn respawn(&self, _spawn_id: u32, count: usize) {
            self.0.fetch_add(count, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_maintenance_respawns() {
        let spawner = Arc::new(CountingSpawner(AtomicUsize::new(0)));
        let ctx = RegionContext {
            visible_range: 3000,
            spawner: spawner.clone(),
        };
        let region = Region::normal(&data(), 1, ctx).unwrap();
        let now = Utc::now();

        let npc = Arc::new(Creature::npc(NPC_ID_START, "Wolf", Location::new(1, 0, 0)).with_spawn_id(12));
        npc.set_disappear_at(Some(now - Duration::seconds(1)));
        region.add_creature(npc.clone()).unwrap();

        let unspawned = Arc::new(Creature::npc(NPC_ID_START + 1, "Fox", Location::new(1, 0, 0)));
        unspawned.set_disappear_at(Some(now - Duration::seconds(1)));
        region.add_creature(unspawned).unwrap();

        region.update_entities(now);
        assert!(region.get_creature(npc.id()).is_none());
        assert_eq!(spawner.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_maintenance_updates_visibility() {
        let region = Region::normal(&data(), 1, RegionContext::default()).unwrap();
        let (_p, mut rx) = player(&region, 0);
        region
            .add_item(Arc::new(Item::new(ITEM_ID_START, 1, 1, Location::new(1, 5, 5))))
            .unwrap();
        drain(&mut rx);

        region.update_entities(Utc::now());
        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].name(), "EntitiesAppeared");

        region.update_entities(Utc::now());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_remove_scripted_entities() {
        let region = Region::normal(&data(), 1, RegionContext::default()).unwrap();
        let (p, _rx) = player(&region, 0);
        region
            .add_creature(Arc::new(Creature::npc(NPC_ID_START, "", Location::new(1, 0, 0))))
            .unwrap();
        region
            .add_prop(Arc::new(Prop::server_side(PROP_ID_START, 1, Location::new(1, 0, 0))))
            .unwrap();

        assert_eq!(region.remove_scripted_entities(), 2);
        assert!(region.get_creature(p.id()).is_some());
        // Client prop stays
        assert_eq!(region.store().props.len(), 1);
    }

    #[test]
    fn test_player_queries() {
        let region = Region::normal(&data(), 1, RegionContext::default()).unwrap();
        let (p, _rx) = player(&region, 0);
        let (pet, _rx2) = player(&region, 100);
        pet.set_master(Some(p.id()));
        pet.set_name("Pet");

        assert_eq!(region.get_all_players().len(), 2);
        assert_eq!(region.count_players(), 1);
        assert_eq!(region.get_player("Pet").unwrap().id(), pet.id());
        assert_eq!(region.get_players_in_range(Position::new(0, 0), 50).len(), 1);

        let others = region.get_visible_creatures_in_range(p.as_ref(), 3000);
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].id(), pet.id());
    }

    struct RecordingAi(AtomicU64);

    impl AiController for RecordingAi {
        fn activate(&self, duration_ms: u64) {
            self.0.store(duration_ms, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_activate_ais() {
        let region = Region::normal(&data(), 1, RegionContext::default()).unwrap();
        let near_ai = Arc::new(RecordingAi(AtomicU64::new(0)));
        let far_ai = Arc::new(RecordingAi(AtomicU64::new(0)));

        region
            .add_creature(Arc::new(
                Creature::npc(NPC_ID_START, "", Location::new(1, 2000, 0)).with_ai(near_ai.clone()),
            ))
            .unwrap();
        region
            .add_creature(Arc::new(
                Creature::npc(NPC_ID_START + 1, "", Location::new(1, 50000, 0)).with_ai(far_ai.clone()),
            ))
            .unwrap();

        let woken = region.activate_ais(100.0, Position::new(0, 0), Position::new(500, 0));
        assert_eq!(woken, 1);
        assert_eq!(near_ai.0.load(Ordering::SeqCst), 5000);
        assert_eq!(far_ai.0.load(Ordering::SeqCst), 0);
    }
}
