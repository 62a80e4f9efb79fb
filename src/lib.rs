//! mxsync - declarative Matrix resource synchronizer.
//!
//! Reconciles rooms, groups, spaces and user accounts on a homeserver
//! against operator-provided manifests, reporting exactly what changed.

pub mod changes;
pub mod cli;
pub mod config;
pub mod diff;
pub mod error;
pub mod ident;
pub mod media;
pub mod output;
pub mod resources;
