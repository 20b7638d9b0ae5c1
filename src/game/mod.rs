//! Game module
//!
//! This module contains the world core of the channel server:
//! - Entities (creatures, props, items) and their positions
//! - Per-region entity stores, visibility and broadcasting
//! - Normal and dynamic regions, owned by the world
//! - Actor building and role-playing sessions

pub mod broadcast;
pub mod builder;
pub mod collision;
pub mod creature;
pub mod dynamic;
pub mod entity;
pub mod item;
pub mod position;
pub mod prop;
pub mod region;
pub mod roleplay;
pub mod store;
pub mod visibility;
pub mod world;
