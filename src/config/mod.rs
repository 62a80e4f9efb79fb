//! Connection configuration and resource manifests.
//!
//! This module is split into logical submodules:
//! - [`types`]: config and manifest struct definitions
//! - [`validation`]: eager manifest validation
//!
//! Everything is TOML deserialized through serde. In manifests, an absent
//! or null field means "no change requested" for that field.

mod types;
mod validation;

pub use types::{
    AccountManifest, ConfigError, ConnectionConfig, GroupManifest, RoomManifest, SpaceManifest,
    StateGoal,
};
pub use validation::{validate_account, validate_group, validate_room, validate_space};
