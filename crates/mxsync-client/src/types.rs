//! Wire-level snapshot types.
//!
//! These are the shapes the reconciliation engine consumes: assembled from
//! raw state events / admin API bodies by the transport, never exposing
//! response-specific structure to callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Maximum power level a member can hold; holders are admins.
pub const LEVEL_ADMIN: i64 = 100;

/// An opaque reference to a stored media object (`mxc://server/id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(pub String);

impl MediaRef {
    /// Split into `(server_name, media_id)`.
    ///
    /// Returns `None` when the URI is not of the `mxc://server/id` form.
    pub fn parts(&self) -> Option<(&str, &str)> {
        let rest = self.0.strip_prefix("mxc://")?;
        let (server, media) = rest.split_once('/')?;
        if server.is_empty() || media.is_empty() {
            return None;
        }
        Some((server, media))
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata of a stored media object, as reported by the media repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMeta {
    /// Byte size of the stored content.
    pub size: u64,
    /// MIME type of the stored content.
    pub mime: String,
    /// Original upload filename, when the repository kept one.
    pub filename: Option<String>,
}

/// Non-user power level defaults of a room.
///
/// Field names and defaults follow `m.room.power_levels`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerLevelDefaults {
    #[serde(default = "default_fifty")]
    pub ban: i64,
    #[serde(default = "default_fifty")]
    pub kick: i64,
    #[serde(default = "default_fifty")]
    pub redact: i64,
    #[serde(default)]
    pub invite: i64,
    #[serde(default = "default_fifty")]
    pub state_default: i64,
    #[serde(default)]
    pub events_default: i64,
    #[serde(default)]
    pub users_default: i64,
}

fn default_fifty() -> i64 {
    50
}

impl Default for PowerLevelDefaults {
    fn default() -> Self {
        Self {
            ban: 50,
            kick: 50,
            redact: 50,
            invite: 0,
            state_default: 50,
            events_default: 0,
            users_default: 0,
        }
    }
}

impl PowerLevelDefaults {
    /// Set a named default. Returns false when the name is not recognized.
    pub fn set(&mut self, key: &str, value: i64) -> bool {
        match key {
            "ban" => self.ban = value,
            "kick" => self.kick = value,
            "redact" => self.redact = value,
            "invite" => self.invite = value,
            "state_default" => self.state_default = value,
            "events_default" => self.events_default = value,
            "users_default" => self.users_default = value,
            _ => return false,
        }
        true
    }

    /// Current value of a named default, if the name is recognized.
    pub fn get(&self, key: &str) -> Option<i64> {
        match key {
            "ban" => Some(self.ban),
            "kick" => Some(self.kick),
            "redact" => Some(self.redact),
            "invite" => Some(self.invite),
            "state_default" => Some(self.state_default),
            "events_default" => Some(self.events_default),
            "users_default" => Some(self.users_default),
            _ => None,
        }
    }
}

/// Power level state of a room: per-user map plus defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerLevels {
    /// Explicit per-user levels.
    #[serde(default)]
    pub users: BTreeMap<String, i64>,
    /// Everything else from the event content.
    #[serde(flatten)]
    pub defaults: PowerLevelDefaults,
}

impl PowerLevels {
    /// Level of a user, falling back to `users_default`.
    pub fn level_of(&self, user_id: &str) -> i64 {
        self.users
            .get(user_id)
            .copied()
            .unwrap_or(self.defaults.users_default)
    }
}

/// A fresh snapshot of a room (or space) as loaded from the homeserver.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub canonical_alias: Option<String>,
    pub name: Option<String>,
    pub topic: Option<String>,
    pub avatar: Option<MediaRef>,
    pub encrypted: bool,
    pub federate: bool,
    pub room_version: Option<String>,
    pub history_visibility: Option<String>,
    pub creator: Option<String>,
    /// Whether the room was created as a space (`m.space` creation type).
    pub is_space: bool,
    /// user id -> membership value (`join`, `invite`, ...).
    pub members: BTreeMap<String, String>,
    pub power_levels: PowerLevels,
    /// `m.space.child` state keys, in event order.
    pub children: Vec<String>,
    /// `m.space.parent` state keys, in event order.
    pub parents: Vec<String>,
}

impl RoomSnapshot {
    /// Assemble a snapshot from the room's full state event list.
    ///
    /// Unknown event types are ignored; `leave`/`ban` memberships are
    /// dropped so `members` only holds current and pending members.
    pub fn from_state_events(room_id: &str, events: &[Value]) -> Self {
        let mut snap = Self {
            room_id: room_id.to_string(),
            federate: true,
            ..Self::default()
        };

        for ev in events {
            let ev_type = ev.get("type").and_then(Value::as_str).unwrap_or("");
            let content = ev.get("content").cloned().unwrap_or(Value::Null);
            match ev_type {
                "m.room.create" => {
                    snap.federate = content
                        .get("m.federate")
                        .and_then(Value::as_bool)
                        .unwrap_or(true);
                    snap.room_version = content
                        .get("room_version")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    snap.is_space =
                        content.get("type").and_then(Value::as_str) == Some("m.space");
                    snap.creator = content
                        .get("creator")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .or_else(|| {
                            ev.get("sender").and_then(Value::as_str).map(str::to_string)
                        });
                }
                "m.room.name" => {
                    snap.name = content
                        .get("name")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                }
                "m.room.topic" => {
                    snap.topic = content
                        .get("topic")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                }
                "m.room.avatar" => {
                    snap.avatar = content
                        .get("url")
                        .and_then(Value::as_str)
                        .map(|u| MediaRef(u.to_string()));
                }
                "m.room.canonical_alias" => {
                    snap.canonical_alias = content
                        .get("alias")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                }
                "m.room.encryption" => {
                    snap.encrypted = content.get("algorithm").is_some();
                }
                "m.room.history_visibility" => {
                    snap.history_visibility = content
                        .get("history_visibility")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                }
                "m.room.power_levels" => {
                    snap.power_levels =
                        serde_json::from_value(content.clone()).unwrap_or_default();
                }
                "m.room.member" => {
                    let membership = content
                        .get("membership")
                        .and_then(Value::as_str)
                        .unwrap_or("leave");
                    if membership == "join" || membership == "invite" {
                        if let Some(user) = ev.get("state_key").and_then(Value::as_str) {
                            snap.members.insert(user.to_string(), membership.to_string());
                        }
                    }
                }
                "m.space.child" => {
                    // An empty content means the child link was removed.
                    if content.as_object().is_some_and(|o| !o.is_empty()) {
                        if let Some(child) = ev.get("state_key").and_then(Value::as_str) {
                            snap.children.push(child.to_string());
                        }
                    }
                }
                "m.space.parent" => {
                    if content.as_object().is_some_and(|o| !o.is_empty()) {
                        if let Some(parent) = ev.get("state_key").and_then(Value::as_str) {
                            snap.parents.push(parent.to_string());
                        }
                    }
                }
                _ => {}
            }
        }

        snap
    }
}

/// Parameters for room (and space) creation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateRoomSpec {
    /// Localpart of the canonical alias (`#<localpart>:domain`).
    #[serde(rename = "room_alias_name", skip_serializing_if = "Option::is_none")]
    pub alias_localpart: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    /// Maps to `m.federate` in `creation_content`; merged there on encode.
    #[serde(skip_serializing)]
    pub federate: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invite: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_level_content_override: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_content: Option<Value>,
}

impl CreateRoomSpec {
    /// Encode to the `createRoom` request body.
    pub fn to_body(&self) -> Value {
        let mut body =
            serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Default::default()));
        if !self.federate {
            if let Some(obj) = body.as_object_mut() {
                let creation = obj
                    .entry("creation_content")
                    .or_insert_with(|| Value::Object(Default::default()));
                if let Some(creation) = creation.as_object_mut() {
                    creation.insert("m.federate".to_string(), Value::Bool(false));
                }
            }
        }
        body
    }
}

/// Profile section of a group summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub long_description: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<MediaRef>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

/// Assembled group state: profile plus membership and room lists.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupSummary {
    pub group_id: String,
    pub profile: GroupProfile,
    /// Joined members.
    pub users: Vec<String>,
    /// Members with a pending invite.
    pub invited_users: Vec<String>,
    /// Room ids attached to the group.
    pub rooms: Vec<String>,
}

impl GroupSummary {
    /// Joined and invited members as one set, the way membership
    /// convergence sees a group.
    pub fn all_members(&self) -> impl Iterator<Item = &String> {
        self.users.iter().chain(self.invited_users.iter())
    }
}

/// A Synapse account, as returned by the admin user API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    /// Fully qualified user id. Filled in by the loader; the admin API
    /// calls this field `name`.
    #[serde(rename = "name", default)]
    pub mxid: Option<String>,
    #[serde(default)]
    pub displayname: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<MediaRef>,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub deactivated: bool,
    #[serde(default)]
    pub threepids: Vec<Value>,
    /// Creation timestamp in milliseconds since the epoch.
    #[serde(default)]
    pub creation_ts: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state_fixture() -> Vec<Value> {
        vec![
            json!({
                "type": "m.room.create",
                "sender": "@op:example.com",
                "content": {"room_version": "9", "m.federate": false}
            }),
            json!({"type": "m.room.name", "content": {"name": "Ops"}}),
            json!({"type": "m.room.topic", "content": {"topic": "war room"}}),
            json!({
                "type": "m.room.avatar",
                "content": {"url": "mxc://example.com/abc123"}
            }),
            json!({
                "type": "m.room.power_levels",
                "content": {"users": {"@op:example.com": 100, "@a:example.com": 50}, "invite": 50}
            }),
            json!({
                "type": "m.room.member",
                "state_key": "@op:example.com",
                "content": {"membership": "join"}
            }),
            json!({
                "type": "m.room.member",
                "state_key": "@gone:example.com",
                "content": {"membership": "leave"}
            }),
            json!({
                "type": "m.room.member",
                "state_key": "@a:example.com",
                "content": {"membership": "invite"}
            }),
        ]
    }

    #[test]
    fn snapshot_assembly() {
        let snap = RoomSnapshot::from_state_events("!r:example.com", &state_fixture());
        assert_eq!(snap.name.as_deref(), Some("Ops"));
        assert_eq!(snap.topic.as_deref(), Some("war room"));
        assert!(!snap.federate);
        assert!(!snap.encrypted);
        assert_eq!(snap.avatar, Some(MediaRef("mxc://example.com/abc123".into())));
        assert_eq!(snap.members.len(), 2);
        assert!(!snap.members.contains_key("@gone:example.com"));
        assert_eq!(snap.power_levels.level_of("@op:example.com"), 100);
        assert_eq!(snap.power_levels.level_of("@nobody:example.com"), 0);
        assert_eq!(snap.power_levels.defaults.invite, 50);
        assert_eq!(snap.power_levels.defaults.ban, 50);
        assert_eq!(snap.creator.as_deref(), Some("@op:example.com"));
    }

    #[test]
    fn space_child_links() {
        let events = vec![
            json!({
                "type": "m.room.create",
                "content": {"type": "m.space", "creator": "@op:example.com"}
            }),
            json!({
                "type": "m.space.child",
                "state_key": "!child:example.com",
                "content": {"via": ["example.com"]}
            }),
            json!({
                "type": "m.space.child",
                "state_key": "!removed:example.com",
                "content": {}
            }),
        ];
        let snap = RoomSnapshot::from_state_events("!s:example.com", &events);
        assert!(snap.is_space);
        assert_eq!(snap.children, vec!["!child:example.com"]);
    }

    #[test]
    fn media_ref_parts() {
        let r = MediaRef("mxc://example.com/abc".into());
        assert_eq!(r.parts(), Some(("example.com", "abc")));
        assert_eq!(MediaRef("https://x/y".into()).parts(), None);
    }

    #[test]
    fn create_room_body_merges_federate() {
        let spec = CreateRoomSpec {
            alias_localpart: Some("ops".into()),
            name: Some("Ops".into()),
            federate: false,
            creation_content: Some(json!({"type": "m.space"})),
            ..Default::default()
        };
        let body = spec.to_body();
        assert_eq!(body["room_alias_name"], "ops");
        assert_eq!(body["creation_content"]["m.federate"], false);
        assert_eq!(body["creation_content"]["type"], "m.space");
    }
}
