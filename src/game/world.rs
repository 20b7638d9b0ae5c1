//! World module
//!
//! Owns every region of the channel:
//! - Normal regions built from static data at startup
//! - Dynamic region instances and their id allocation
//! - Moving creatures between regions (remove, then add)
//! - The maintenance tick loop, run over all regions in parallel

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use rayon::prelude::*;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::creature::Creature;
use super::dynamic::DynamicRegionManager;
use super::entity::{Entity, EntityId, RegionId};
use super::position::Location;
use super::region::{log_area_failure, NoRespawn, Region, RegionContext, SpawnRegistry};
use crate::config::{ServerConfig, DEFAULT_VISIBLE_RANGE};
use crate::data::GameData;
use crate::error::RegionError;
use crate::net::message::Notification;
use crate::net::transport::{DefaultTransportFactory, TransportFactory};

/// Default maintenance tick rate in milliseconds
pub const TICK_RATE_MS: u64 = 500;

/// World settings
#[derive(Debug, Clone)]
pub struct WorldSettings {
    /// Channel name
    pub name: String,
    /// Tick rate in milliseconds
    pub tick_rate_ms: u64,
    /// Radius within which creatures see each other
    pub visible_range: i32,
    /// Host sent with secondary login requests
    pub channel_host: String,
    /// Port sent with secondary login requests
    pub channel_port: u16,
    /// Ids handed out to dynamic regions
    pub dynamic_regions: RangeInclusive<RegionId>,
    /// Last resort when a return location no longer exists
    pub fallback_location: Location,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            name: "Ch1".to_string(),
            tick_rate_ms: TICK_RATE_MS,
            visible_range: DEFAULT_VISIBLE_RANGE,
            channel_host: "127.0.0.1".to_string(),
            channel_port: 11020,
            dynamic_regions: 35001..=40000,
            fallback_location: Location::new(1, 12800, 38100),
        }
    }
}

impl WorldSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            name: config.server_name.clone(),
            tick_rate_ms: config.tick_rate_ms,
            visible_range: config.visible_range,
            channel_host: config.channel_host.clone(),
            channel_port: config.channel_port,
            dynamic_regions: config.dynamic_region_range(),
            fallback_location: config.fallback_location,
        }
    }

    /// Set the channel name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the tick rate
    pub fn with_tick_rate(mut self, tick_rate_ms: u64) -> Self {
        self.tick_rate_ms = tick_rate_ms;
        self
    }

    /// Set the visible range
    pub fn with_visible_range(mut self, range: i32) -> Self {
        self.visible_range = range;
        self
    }

    /// Set the dynamic region id range
    pub fn with_dynamic_regions(mut self, range: RangeInclusive<RegionId>) -> Self {
        self.dynamic_regions = range;
        self
    }

    pub fn with_fallback_location(mut self, location: Location) -> Self {
        self.fallback_location = location;
        self
    }
}

/// World state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldState {
    /// World is initializing
    Initializing,
    /// World is running normally
    Running,
    /// World is shutting down
    ShuttingDown,
    /// World has stopped
    Stopped,
}

impl WorldState {
    /// Check if the world is processing ticks
    pub fn is_active(&self) -> bool {
        matches!(self, WorldState::Running)
    }
}

/// Channel world - owns the regions and drives their maintenance
pub struct World {
    /// World settings
    pub settings: WorldSettings,
    data: Arc<GameData>,
    regions: DashMap<RegionId, Arc<Region>>,
    dynamic: DynamicRegionManager,
    ctx: RegionContext,
    transports: Arc<dyn TransportFactory>,
    state: RwLock<WorldState>,
    tick: AtomicU64,
    running: AtomicBool,
    start_time: RwLock<Option<Instant>>,
}

impl World {
    /// Create a world with its collaborators
    pub fn new(
        settings: WorldSettings,
        data: Arc<GameData>,
        spawner: Arc<dyn SpawnRegistry>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        info!(name = %settings.name, "Creating channel world");

        let ctx = RegionContext {
            visible_range: settings.visible_range,
            spawner,
        };
        let dynamic = DynamicRegionManager::new(settings.dynamic_regions.clone());

        Self {
            settings,
            data,
            regions: DashMap::new(),
            dynamic,
            ctx,
            transports,
            state: RwLock::new(WorldState::Initializing),
            tick: AtomicU64::new(0),
            running: AtomicBool::new(false),
            start_time: RwLock::new(None),
        }
    }

    /// World with no respawns and disconnected-only transports
    pub fn with_data(settings: WorldSettings, data: Arc<GameData>) -> Self {
        Self::new(settings, data, Arc::new(NoRespawn), Arc::new(DefaultTransportFactory))
    }

    pub fn data(&self) -> &GameData {
        &self.data
    }

    pub fn transports(&self) -> &Arc<dyn TransportFactory> {
        &self.transports
    }

    pub fn channel_host(&self) -> &str {
        &self.settings.channel_host
    }

    pub fn channel_port(&self) -> u16 {
        self.settings.channel_port
    }

    // Regions

    /// Build a normal region for every region in the static data
    pub fn load_regions(&self) -> Result<usize, RegionError> {
        let ids = self.data.region_ids();
        for id in &ids {
            let region = Region::normal(&self.data, *id, self.ctx.clone())?;
            self.add_region(region);
        }

        info!(count = ids.len(), "Regions loaded");
        Ok(ids.len())
    }

    /// Register a normal region, replacing any previous one with that id
    pub fn add_region(&self, region: Region) -> Arc<Region> {
        let region = Arc::new(region);
        if self.regions.insert(region.id(), region.clone()).is_some() {
            warn!(region_id = region.id(), "Region replaced");
        }
        region
    }

    /// Normal or dynamic region by id
    pub fn get_region(&self, id: RegionId) -> Option<Arc<Region>> {
        self.regions
            .get(&id)
            .map(|r| r.value().clone())
            .or_else(|| self.dynamic.get(id))
    }

    pub fn has_region(&self, id: RegionId) -> bool {
        self.regions.contains_key(&id) || self.dynamic.contains(id)
    }

    /// Number of normal and dynamic regions
    pub fn region_count(&self) -> usize {
        self.regions.len() + self.dynamic.len()
    }

    /// Snapshot of every region
    pub fn regions(&self) -> Vec<Arc<Region>> {
        let mut regions: Vec<Arc<Region>> = self.regions.iter().map(|r| r.value().clone()).collect();
        regions.extend(self.dynamic.regions());
        regions
    }

    /// Create an instanced copy of `base_id`
    pub fn create_dynamic_region(
        &self,
        base_id: RegionId,
        variation: Option<String>,
    ) -> Result<Arc<Region>, RegionError> {
        let id = self.dynamic.allocate_id()?;

        let region = match Region::dynamic(&self.data, base_id, id, variation, self.ctx.clone()) {
            Ok(region) => Arc::new(region),
            Err(e) => {
                self.dynamic.release_id(id);
                log_area_failure(&e);
                return Err(e);
            }
        };

        self.dynamic.add(region.clone());
        info!(region_id = id, base_id = base_id, "Dynamic region created");
        Ok(region)
    }

    /// Strip a dynamic region of scripted entities and free its id
    pub fn remove_dynamic_region(&self, id: RegionId) -> bool {
        let Some(region) = self.dynamic.get(id) else {
            return false;
        };

        region.remove_scripted_entities();
        let players = region.count_players();
        if players > 0 {
            warn!(region_id = id, players = players, "Removing dynamic region with players inside");
        }

        self.dynamic.remove(id);
        info!(region_id = id, "Dynamic region removed");
        true
    }

    pub fn dynamic_region_count(&self) -> usize {
        self.dynamic.len()
    }

    // Creatures

    /// Move a creature to `to`, possibly into another region
    ///
    /// The target region is checked first; a refused move leaves the
    /// creature where it was.
    pub fn move_creature(&self, creature: &Arc<Creature>, to: Location) -> Result<(), RegionError> {
        let target = self
            .get_region(to.region_id)
            .ok_or(RegionError::InvalidZone(to.region_id))?;

        let previous = creature.location();
        let old_region = creature
            .region_id()
            .and_then(|id| self.get_region(id))
            .filter(|region| region.remove_creature(creature.id()).is_some());

        creature.set_location(to);
        if let Err(e) = target.add_creature(creature.clone()) {
            error!(
                creature_id = creature.id(),
                region_id = to.region_id,
                error = %e,
                "Failed to add creature to region"
            );
            creature.set_location(previous);
            if let Some(region) = &old_region {
                if let Err(e) = region.add_creature(creature.clone()) {
                    error!(creature_id = creature.id(), error = %e, "Failed to restore creature");
                }
            }
            return Err(e);
        }

        debug!(creature_id = creature.id(), from = %previous, to = %to, "Creature moved");
        Ok(())
    }

    /// Warp a creature, telling its client to enter the target region
    pub fn warp(&self, creature: &Arc<Creature>, to: Location) -> Result<(), RegionError> {
        if !self.has_region(to.region_id) {
            creature
                .client()
                .send(Notification::ServerMessage("Warp failed, region doesn't exist.".to_string()));
            error!(creature_id = creature.id(), region_id = to.region_id, "Warp to unknown region");
            return Err(RegionError::InvalidZone(to.region_id));
        }

        if creature.region_id() == Some(to.region_id) {
            creature.set_location(to);
            return Ok(());
        }

        self.move_creature(creature, to)?;
        creature.client().send(Notification::EnterRegion {
            creature: creature.id(),
            location: to,
        });
        Ok(())
    }

    /// Look a creature up in every region
    pub fn find_creature(&self, id: EntityId) -> Option<Arc<Creature>> {
        self.regions().into_iter().find_map(|r| r.get_creature(id))
    }

    /// Players across all regions
    pub fn player_count(&self) -> usize {
        self.regions().iter().map(|r| r.count_players()).sum()
    }

    // Lifecycle

    /// Get the current world state
    pub fn state(&self) -> WorldState {
        *self.state.read()
    }

    /// Set the world state
    pub fn set_state(&self, new_state: WorldState) {
        let mut state = self.state.write();
        let old_state = *state;
        *state = new_state;
        info!(
            old_state = ?old_state,
            new_state = ?new_state,
            "World state changed"
        );
    }

    /// Get the current tick number
    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::SeqCst)
    }

    /// Check if the world is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask a running tick loop to stop at its next tick
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Get the uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .read()
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    /// One maintenance pass over every region, regions in parallel
    pub fn process_tick(&self, now: DateTime<Utc>) {
        let tick_num = self.tick.fetch_add(1, Ordering::SeqCst);

        let regions = self.regions();
        regions.par_iter().for_each(|region| region.update_entities(now));

        if tick_num % 1000 == 0 {
            debug!(
                tick = tick_num,
                regions = regions.len(),
                "World tick milestone"
            );
        }
    }

    /// Run the maintenance loop until shutdown
    pub async fn run(&self, shutdown_rx: &mut broadcast::Receiver<()>) {
        info!(
            name = %self.settings.name,
            tick_rate_ms = self.settings.tick_rate_ms,
            regions = self.region_count(),
            "Starting channel world"
        );

        self.running.store(true, Ordering::SeqCst);
        *self.start_time.write() = Some(Instant::now());
        self.set_state(WorldState::Running);

        let mut tick_interval = interval(Duration::from_millis(self.settings.tick_rate_ms));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    if !self.is_running() {
                        break;
                    }
                    self.process_tick(Utc::now());
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.set_state(WorldState::ShuttingDown);
        self.running.store(false, Ordering::SeqCst);
        self.set_state(WorldState::Stopped);

        info!(
            total_ticks = self.tick(),
            uptime_secs = self.uptime_secs(),
            "Channel world stopped"
        );
    }

    /// Get world info as a string
    pub fn info(&self) -> String {
        format!(
            "Channel {} - {} regions - {} players - Tick {} - Uptime {}s",
            self.settings.name,
            self.region_count(),
            self.player_count(),
            self.tick(),
            self.uptime_secs()
        )
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .field("tick", &self.tick())
            .field("running", &self.is_running())
            .field("regions", &self.region_count())
            .finish()
    }
}
