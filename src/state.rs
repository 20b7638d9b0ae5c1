//! Application state module
//!
//! Ties together the configuration, static data and the world the binary
//! runs. Library users can build the same pieces directly.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::config::ServerConfig;
use crate::data::GameData;
use crate::error::Result;
use crate::game::region::{NoRespawn, SpawnRegistry};
use crate::game::world::{World, WorldSettings};
use crate::net::transport::{DefaultTransportFactory, TransportFactory};

/// Application state shared across the server's tasks
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Static game data
    pub data: Arc<GameData>,
    /// Channel world
    pub world: Arc<World>,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Load static data from the configured path and build the world
    pub fn new(config: ServerConfig, shutdown_tx: broadcast::Sender<()>) -> Result<Self> {
        let data = Arc::new(GameData::load(&config.world_data_path())?);
        Self::with_data(
            config,
            data,
            Arc::new(NoRespawn),
            Arc::new(DefaultTransportFactory),
            shutdown_tx,
        )
    }

    /// Build the world over already loaded data and explicit collaborators
    pub fn with_data(
        config: ServerConfig,
        data: Arc<GameData>,
        spawner: Arc<dyn SpawnRegistry>,
        transports: Arc<dyn TransportFactory>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Result<Self> {
        let settings = WorldSettings::from_config(&config);
        let world = Arc::new(World::new(settings, data.clone(), spawner, transports));

        let regions = world.load_regions()?;
        info!(regions = regions, "World initialized");

        Ok(Self {
            config,
            data,
            world,
            shutdown_tx,
        })
    }

    /// Signal every task to shut down
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
