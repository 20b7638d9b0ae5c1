//! Error handling module
//!
//! Defines custom error types for the channel world core.

use std::io;

use thiserror::Error;

use crate::game::entity::{EntityId, EntityKind, RegionId};

/// Main error type for the channel world
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Region and entity store errors
    #[error("Region error: {0}")]
    Region(#[from] RegionError),

    /// Actor substitution errors
    #[error("Role-play error: {0}")]
    RolePlay(#[from] RolePlayError),

    /// Static game data errors
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Region-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegionError {
    #[error("{kind} 0x{id:016X} is already present")]
    DuplicateId { kind: EntityKind, id: EntityId },

    #[error("Entity 0x{id:016X} is still owned by region {region}")]
    EntityOwned { id: EntityId, region: RegionId },

    #[error("Region {0} does not exist")]
    InvalidZone(RegionId),

    #[error("Area {area_id} not found in region {base_id}")]
    AreaResolutionFailure { area_id: u32, base_id: RegionId },

    #[error("No free dynamic region ids left")]
    DynamicRegionsExhausted,
}

/// Actor substitution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RolePlayError {
    #[error("Actor 0x{actor:016X} is already bound to 0x{controller:016X}")]
    ActorAlreadyBound {
        actor: EntityId,
        controller: EntityId,
    },

    #[error("Actor 0x{0:016X} already has a connected client")]
    ActorAlreadyConnected(EntityId),

    #[error("Creature 0x{0:016X} is already controlling an actor")]
    AlreadySubstituting(EntityId),

    #[error("Creature 0x{0:016X} has no active role-playing session")]
    NoActiveSession(EntityId),

    #[error("Creature 0x{0:016X} is not a connected player")]
    NotAPlayer(EntityId),

    #[error("Region {0} does not exist")]
    InvalidZone(RegionId),

    #[error("Actor placement failed: {0}")]
    Placement(#[from] RegionError),
}

/// Static game data errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Failed to read game data: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse game data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Race {0} not found")]
    UnknownRace(u32),

    #[error("Race has to be set before the actor is finalized")]
    RaceNotSet,
}

/// Result type alias for channel world operations
pub type Result<T> = std::result::Result<T, ChannelError>;
