//! # mxsync-client
//!
//! Transport layer for `mxsync`: the [`RemoteDirectory`] trait describing
//! every homeserver operation the reconcilers consume, the snapshot types
//! those operations exchange, and [`HttpDirectory`], the reqwest-backed
//! implementation speaking the Matrix client-server API, the media
//! repository API and the Synapse admin API.
//!
//! The reconciliation engine lives in the root crate and never touches
//! HTTP directly; swapping this crate's implementation for an in-memory
//! one is how the engine is tested.

#![deny(clippy::all)]
#![warn(missing_docs)]

mod directory;
mod error;
mod http;
mod types;

pub use directory::RemoteDirectory;
pub use error::RemoteError;
pub use http::HttpDirectory;
pub use types::{
    Account, CreateRoomSpec, GroupProfile, GroupSummary, MediaMeta, MediaRef, PowerLevelDefaults,
    PowerLevels, RoomSnapshot, LEVEL_ADMIN,
};
