//! Channel World Library
//!
//! Core of a channel server's world: regions, the entities living in them,
//! what each player can see, and role-playing sessions in which a player
//! drives a server-owned NPC.
//!
//! ## Modules
//!
//! - `config` - Server configuration management
//! - `data` - Static game data (regions, areas, races, items)
//! - `error` - Error types and result definitions
//! - `game` - Regions, entities, visibility and role-play
//! - `net` - Notifications, transports and client sessions
//! - `state` - Application state shared by the binary

pub mod config;
pub mod data;
pub mod error;
pub mod game;
pub mod net;
pub mod state;

// Re-export commonly used types
pub use config::ServerConfig;
pub use data::GameData;
pub use error::{ChannelError, RegionError, Result, RolePlayError};
pub use game::region::Region;
pub use game::roleplay::{RolePlayState, RolePlayingSession};
pub use game::world::{World, WorldSettings};
pub use state::AppState;

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
