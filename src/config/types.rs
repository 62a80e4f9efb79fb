//! Core configuration and manifest types.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zeroize::Zeroizing;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no access token: set `token`, `token_file` or MXSYNC_TOKEN")]
    MissingToken,
    #[error("invalid manifest: {0}")]
    Invalid(String),
}

/// Homeserver connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Homeserver URI (e.g. `https://matrix.example.com`).
    pub homeserver: String,
    /// Domain identifiers are qualified against (e.g. `example.com`).
    pub domain: String,
    /// Login of the acting user. Resolved via `whoami` when omitted.
    pub user: Option<String>,
    /// Access token, inline. Prefer `token_file` or MXSYNC_TOKEN.
    token: Option<String>,
    /// File holding the access token.
    token_file: Option<PathBuf>,
}

impl ConnectionConfig {
    /// Load connection settings from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ConnectionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Resolve the access token: inline value, token file, or the
    /// MXSYNC_TOKEN environment variable, in that order.
    pub fn access_token(&self) -> Result<Zeroizing<String>, ConfigError> {
        if let Some(token) = &self.token {
            return Ok(Zeroizing::new(token.clone()));
        }
        if let Some(path) = &self.token_file {
            let raw = std::fs::read_to_string(path)?;
            return Ok(Zeroizing::new(raw.trim().to_string()));
        }
        if let Ok(token) = std::env::var("MXSYNC_TOKEN") {
            return Ok(Zeroizing::new(token));
        }
        Err(ConfigError::MissingToken)
    }
}

/// Requested top-level transition for a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateGoal {
    /// The resource exists and matches the manifest.
    #[default]
    Present,
    /// The resource is gone.
    Absent,
    /// Rooms only: sealed against re-entry, content retained.
    Archived,
    /// Accounts only: alias for `absent` (deactivation).
    Deactivated,
}

impl StateGoal {
    /// Whether the goal asks for removal rather than convergence.
    pub fn is_removal(self) -> bool {
        !matches!(self, Self::Present)
    }
}

fn load_manifest<T: serde::de::DeserializeOwned, P: AsRef<Path>>(
    path: P,
) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Desired state of a room.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomManifest {
    /// Alias localpart or fully qualified alias/room id.
    pub alias: String,
    pub name: Option<String>,
    pub topic: Option<String>,
    /// Avatar source: local path, http(s) URL or data URL.
    pub avatar: Option<String>,
    /// Directory visibility: `public` or `private`.
    pub visibility: Option<String>,
    /// Creation preset (`private_chat`, `trusted_private_chat`,
    /// `public_chat`). Only used when the room is created.
    pub preset: Option<String>,
    /// Whether the room federates. Only used when the room is created.
    pub federate: Option<bool>,
    /// Enable end-to-end encryption. Enabling is one-way.
    pub encrypt: Option<bool>,
    /// Desired membership: login → power level.
    pub members: Option<BTreeMap<String, i64>>,
    /// Non-user power level defaults to override.
    pub power_level_override: Option<BTreeMap<String, i64>>,
    #[serde(default)]
    pub state: StateGoal,
    /// On deletion: seal the room id against re-entry.
    #[serde(default)]
    pub block: bool,
    /// On deletion: purge history from the database.
    #[serde(default)]
    pub purge: bool,
}

impl RoomManifest {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let manifest: Self = load_manifest(path)?;
        super::validate_room(&manifest)?;
        Ok(manifest)
    }
}

/// Desired state of a group (legacy community).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupManifest {
    /// Group localpart or fully qualified `+x:y` id.
    pub localpart: String,
    pub name: Option<String>,
    /// Short description shown in the group profile.
    pub description: Option<String>,
    pub long_description: Option<String>,
    pub avatar: Option<String>,
    /// `public` or `private`; applied to rooms attached to the group.
    pub visibility: Option<String>,
    /// Desired member logins. Convergence removes absentees.
    pub members: Option<Vec<String>>,
    /// Room aliases or ids to attach. Add-only.
    pub rooms: Option<Vec<String>>,
    #[serde(default)]
    pub state: StateGoal,
}

impl GroupManifest {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let manifest: Self = load_manifest(path)?;
        super::validate_group(&manifest)?;
        Ok(manifest)
    }
}

/// Desired state of a space.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpaceManifest {
    /// Space localpart or fully qualified `!x:y` room id.
    pub localpart: String,
    pub name: Option<String>,
    pub topic: Option<String>,
    pub avatar: Option<String>,
    /// Creation visibility (`public` or `private`).
    pub visibility: Option<String>,
    /// Desired member logins (invited, no levels).
    pub members: Option<Vec<String>>,
    /// Child rooms (aliases or ids). Add-only.
    pub rooms: Option<Vec<String>>,
    /// Parent space to link under.
    pub parent: Option<String>,
    #[serde(default)]
    pub state: StateGoal,
}

impl SpaceManifest {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let manifest: Self = load_manifest(path)?;
        super::validate_space(&manifest)?;
        Ok(manifest)
    }
}

/// Desired state of a user account.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountManifest {
    /// Login or fully qualified `@x:y` user id.
    pub login: String,
    pub displayname: Option<String>,
    pub avatar: Option<String>,
    /// Server admin flag.
    pub admin: Option<bool>,
    #[serde(default)]
    pub state: StateGoal,
}

impl AccountManifest {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let manifest: Self = load_manifest(path)?;
        super::validate_account(&manifest)?;
        Ok(manifest)
    }
}
