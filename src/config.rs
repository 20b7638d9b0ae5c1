//! Server configuration module
//!
//! Handles loading and parsing of channel configuration from files and environment variables.

use std::env;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::game::entity::RegionId;
use crate::game::position::Location;

/// Default visibility radius
pub const DEFAULT_VISIBLE_RANGE: i32 = 3000;

/// Channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Channel name displayed to players
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Host clients connect to; sent with secondary login requests
    #[serde(default = "default_channel_host")]
    pub channel_host: String,

    /// Channel port; sent with secondary login requests
    #[serde(default = "default_channel_port")]
    pub channel_port: u16,

    /// Path to data files (world.json)
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Maintenance tick rate in milliseconds
    #[serde(default = "default_tick_rate")]
    pub tick_rate_ms: u64,

    /// Radius within which creatures see each other
    #[serde(default = "default_visible_range")]
    pub visible_range: i32,

    /// First id handed to dynamic regions
    #[serde(default = "default_dynamic_region_start")]
    pub dynamic_region_start: RegionId,

    /// Last id handed to dynamic regions
    #[serde(default = "default_dynamic_region_end")]
    pub dynamic_region_end: RegionId,

    /// Where a player is put when its return location no longer exists
    #[serde(default = "default_fallback_location")]
    pub fallback_location: Location,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
}

// Default value functions
fn default_server_name() -> String {
    "Ch1".to_string()
}

fn default_channel_host() -> String {
    "127.0.0.1".to_string()
}

fn default_channel_port() -> u16 {
    11020
}

fn default_data_path() -> PathBuf {
    PathBuf::from("./data")
}

fn default_tick_rate() -> u64 {
    500
}

fn default_visible_range() -> i32 {
    DEFAULT_VISIBLE_RANGE
}

fn default_dynamic_region_start() -> RegionId {
    35001
}

fn default_dynamic_region_end() -> RegionId {
    40000
}

fn default_fallback_location() -> Location {
    Location::new(1, 12800, 38100)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/channel.toml"),
            server_name: default_server_name(),
            channel_host: default_channel_host(),
            channel_port: default_channel_port(),
            data_path: default_data_path(),
            tick_rate_ms: default_tick_rate(),
            visible_range: default_visible_range(),
            dynamic_region_start: default_dynamic_region_start(),
            dynamic_region_end: default_dynamic_region_end(),
            fallback_location: default_fallback_location(),
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        let config_path = env::var("CHANNEL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/channel.toml"));

        let mut config = Self::load_from(&config_path).await?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file, without env overrides
    ///
    /// A missing file yields the defaults.
    pub async fn load_from(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            Self::parse(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path.to_path_buf();
        Ok(config)
    }

    /// Parse a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("CHANNEL_SERVER_NAME") {
            self.server_name = val;
        }
        if let Ok(val) = env::var("CHANNEL_HOST") {
            self.channel_host = val;
        }
        if let Ok(val) = env::var("CHANNEL_PORT") {
            if let Ok(port) = val.parse() {
                self.channel_port = port;
            }
        }
        if let Ok(val) = env::var("CHANNEL_DATA_PATH") {
            self.data_path = PathBuf::from(val);
        }
        if let Ok(val) = env::var("CHANNEL_TICK_RATE_MS") {
            if let Ok(rate) = val.parse() {
                self.tick_rate_ms = rate;
            }
        }
        if let Ok(val) = env::var("CHANNEL_VISIBLE_RANGE") {
            if let Ok(range) = val.parse() {
                self.visible_range = range;
            }
        }
        if let Ok(val) = env::var("CHANNEL_DEBUG") {
            self.debug = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.channel_port == 0 {
            anyhow::bail!("Channel port must not be 0");
        }

        if self.tick_rate_ms < 50 || self.tick_rate_ms > 5000 {
            anyhow::bail!("Tick rate must be between 50ms and 5000ms");
        }

        if self.visible_range <= 0 {
            anyhow::bail!("Visible range must be positive");
        }

        if self.dynamic_region_start > self.dynamic_region_end {
            anyhow::bail!(
                "Dynamic region range {}..={} is empty",
                self.dynamic_region_start,
                self.dynamic_region_end
            );
        }

        Ok(())
    }

    /// Ids available to dynamic regions
    pub fn dynamic_region_range(&self) -> RangeInclusive<RegionId> {
        self.dynamic_region_start..=self.dynamic_region_end
    }

    /// Path of the static world data file
    pub fn world_data_path(&self) -> PathBuf {
        self.data_path.join("world.json")
    }
}
