//! Integration test common infrastructure.
//!
//! Provides an in-memory [`MockDirectory`] that implements the full
//! `RemoteDirectory` surface over mutable state, records every mutating
//! call, and can inject failures per operation.

use async_trait::async_trait;
use mxsync_client::{
    Account, CreateRoomSpec, GroupSummary, MediaMeta, MediaRef, PowerLevels, RemoteDirectory,
    RemoteError, RoomSnapshot,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

pub const DOMAIN: &str = "example.com";
pub const ACTING: &str = "@syncbot:example.com";

#[derive(Default)]
struct State {
    aliases: BTreeMap<String, String>,
    rooms: BTreeMap<String, RoomSnapshot>,
    visibility: BTreeMap<String, String>,
    accounts: BTreeMap<String, Account>,
    groups: BTreeMap<String, GroupSummary>,
    media: BTreeMap<String, MediaMeta>,
    next_room: u32,
    next_event: u32,
    next_media: u32,
}

/// In-memory homeserver double.
#[derive(Default)]
pub struct MockDirectory {
    state: Mutex<State>,
    mutations: Mutex<Vec<String>>,
    fail_on: Mutex<HashSet<&'static str>>,
}

#[allow(dead_code)]
impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a room and its canonical alias.
    pub fn seed_room(&self, snap: RoomSnapshot) {
        let mut state = self.state.lock().unwrap();
        if let Some(alias) = &snap.canonical_alias {
            state.aliases.insert(alias.clone(), snap.room_id.clone());
        }
        state.rooms.insert(snap.room_id.clone(), snap);
    }

    pub fn seed_account(&self, account: Account) {
        let mut state = self.state.lock().unwrap();
        let mxid = account.mxid.clone().expect("seeded account needs an mxid");
        state.accounts.insert(mxid, account);
    }

    pub fn seed_group(&self, summary: GroupSummary) {
        let mut state = self.state.lock().unwrap();
        state.groups.insert(summary.group_id.clone(), summary);
    }

    pub fn seed_media(&self, uri: &str, meta: MediaMeta) {
        let mut state = self.state.lock().unwrap();
        state.media.insert(uri.to_string(), meta);
    }

    pub fn seed_visibility(&self, room_id: &str, visibility: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .visibility
            .insert(room_id.to_string(), visibility.to_string());
    }

    /// Make one operation fail with a remote error.
    pub fn fail_on(&self, op: &'static str) {
        self.fail_on.lock().unwrap().insert(op);
    }

    /// Every mutating call so far, in order.
    pub fn mutations(&self) -> Vec<String> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn upload_count(&self) -> u32 {
        self.state.lock().unwrap().next_media
    }

    pub fn room(&self, room_id: &str) -> Option<RoomSnapshot> {
        self.state.lock().unwrap().rooms.get(room_id).cloned()
    }

    pub fn group(&self, group_id: &str) -> Option<GroupSummary> {
        self.state.lock().unwrap().groups.get(group_id).cloned()
    }

    pub fn account_state(&self, mxid: &str) -> Option<Account> {
        self.state.lock().unwrap().accounts.get(mxid).cloned()
    }

    fn record(&self, call: impl Into<String>) {
        self.mutations.lock().unwrap().push(call.into());
    }

    fn maybe_fail(&self, op: &'static str) -> Result<(), RemoteError> {
        if self.fail_on.lock().unwrap().contains(op) {
            return Err(RemoteError::api(500, None, format!("injected failure: {op}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteDirectory for MockDirectory {
    async fn whoami(&self) -> Result<String, RemoteError> {
        Ok(ACTING.to_string())
    }

    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>, RemoteError> {
        Ok(self.state.lock().unwrap().aliases.get(alias).cloned())
    }

    async fn room_snapshot(&self, room_id: &str) -> Result<Option<RoomSnapshot>, RemoteError> {
        Ok(self.state.lock().unwrap().rooms.get(room_id).cloned())
    }

    async fn put_room_state(
        &self,
        room_id: &str,
        event_type: &str,
        state_key: &str,
        content: Value,
    ) -> Result<(), RemoteError> {
        self.maybe_fail("put_room_state")?;
        self.record(format!("put_state:{event_type}"));
        let mut state = self.state.lock().unwrap();
        let room = state
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RemoteError::api(404, Some("M_NOT_FOUND".into()), "no room"))?;
        match event_type {
            "m.room.name" => {
                room.name = content.get("name").and_then(Value::as_str).map(String::from);
            }
            "m.room.topic" => {
                room.topic = content.get("topic").and_then(Value::as_str).map(String::from);
            }
            "m.room.avatar" => {
                room.avatar = content
                    .get("url")
                    .and_then(Value::as_str)
                    .map(|u| MediaRef(u.to_string()));
            }
            "m.room.encryption" => {
                room.encrypted = true;
            }
            "m.room.power_levels" => {
                room.power_levels = serde_json::from_value::<PowerLevels>(content)
                    .map_err(|e| RemoteError::Shape(e.to_string()))?;
            }
            "m.space.child" => {
                if !room.children.iter().any(|c| c == state_key) {
                    room.children.push(state_key.to_string());
                }
            }
            "m.space.parent" => {
                if !room.parents.iter().any(|p| p == state_key) {
                    room.parents.push(state_key.to_string());
                }
            }
            other => {
                return Err(RemoteError::Shape(format!("unhandled event type {other}")));
            }
        }
        Ok(())
    }

    async fn create_room(&self, spec: &CreateRoomSpec) -> Result<String, RemoteError> {
        self.maybe_fail("create_room")?;
        self.record("create_room");
        let mut state = self.state.lock().unwrap();
        let room_id = format!("!room{}:{DOMAIN}", state.next_room);
        state.next_room += 1;

        let mut snap = RoomSnapshot {
            room_id: room_id.clone(),
            name: spec.name.clone(),
            topic: spec.topic.clone(),
            federate: spec.federate,
            creator: Some(ACTING.to_string()),
            is_space: spec
                .creation_content
                .as_ref()
                .and_then(|c| c.get("type"))
                .and_then(Value::as_str)
                == Some("m.space"),
            ..Default::default()
        };
        snap.members.insert(ACTING.to_string(), "join".into());
        snap.power_levels.users.insert(ACTING.to_string(), 100);
        for invitee in &spec.invite {
            snap.members.insert(invitee.clone(), "invite".into());
        }
        if let Some(alias) = &spec.alias_localpart {
            let fq = format!("#{alias}:{DOMAIN}");
            snap.canonical_alias = Some(fq.clone());
            if state.aliases.contains_key(&fq) {
                return Err(RemoteError::api(
                    400,
                    Some("M_ROOM_IN_USE".into()),
                    "Room alias already taken",
                ));
            }
            state.aliases.insert(fq, room_id.clone());
        }
        if let Some(visibility) = &spec.visibility {
            state.visibility.insert(room_id.clone(), visibility.clone());
        }
        state.rooms.insert(room_id.clone(), snap);
        Ok(room_id)
    }

    async fn invite(&self, room_id: &str, user_id: &str) -> Result<(), RemoteError> {
        self.maybe_fail("invite")?;
        self.record(format!("invite:{user_id}"));
        let mut state = self.state.lock().unwrap();
        let room = state
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RemoteError::api(404, Some("M_NOT_FOUND".into()), "no room"))?;
        room.members.insert(user_id.to_string(), "invite".into());
        Ok(())
    }

    async fn kick(&self, room_id: &str, user_id: &str) -> Result<(), RemoteError> {
        self.maybe_fail("kick")?;
        self.record(format!("kick:{user_id}"));
        let mut state = self.state.lock().unwrap();
        let room = state
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RemoteError::api(404, Some("M_NOT_FOUND".into()), "no room"))?;
        room.members.remove(user_id);
        room.power_levels.users.remove(user_id);
        Ok(())
    }

    async fn room_visibility(&self, room_id: &str) -> Result<String, RemoteError> {
        self.maybe_fail("room_visibility")?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .visibility
            .get(room_id)
            .cloned()
            .unwrap_or_else(|| "private".to_string()))
    }

    async fn set_room_visibility(
        &self,
        room_id: &str,
        visibility: &str,
    ) -> Result<(), RemoteError> {
        self.maybe_fail("set_room_visibility")?;
        self.record(format!("set_visibility:{visibility}"));
        self.state
            .lock()
            .unwrap()
            .visibility
            .insert(room_id.to_string(), visibility.to_string());
        Ok(())
    }

    async fn make_room_admin(&self, room_id: &str, user_id: &str) -> Result<(), RemoteError> {
        self.maybe_fail("make_room_admin")?;
        self.record(format!("make_room_admin:{user_id}"));
        let mut state = self.state.lock().unwrap();
        let room = state
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RemoteError::api(404, Some("M_NOT_FOUND".into()), "no room"))?;
        room.members.insert(user_id.to_string(), "join".into());
        room.power_levels.users.insert(user_id.to_string(), 100);
        Ok(())
    }

    async fn delete_room(
        &self,
        room_id: &str,
        block: bool,
        purge: bool,
    ) -> Result<Value, RemoteError> {
        self.maybe_fail("delete_room")?;
        self.record(format!("delete_room:block={block},purge={purge}"));
        let mut state = self.state.lock().unwrap();
        state.rooms.remove(room_id);
        state.aliases.retain(|_, id| id.as_str() != room_id);
        Ok(serde_json::json!({"kicked_users": [], "local_aliases": []}))
    }

    async fn send_message(&self, _room_id: &str, _content: Value) -> Result<String, RemoteError> {
        self.maybe_fail("send_message")?;
        self.record("send_message");
        let mut state = self.state.lock().unwrap();
        let event_id = format!("$event{}", state.next_event);
        state.next_event += 1;
        Ok(event_id)
    }

    async fn upload_media(
        &self,
        bytes: Vec<u8>,
        mime: &str,
        filename: &str,
    ) -> Result<MediaRef, RemoteError> {
        self.maybe_fail("upload_media")?;
        self.record(format!("upload_media:{filename}"));
        let mut state = self.state.lock().unwrap();
        let uri = format!("mxc://{DOMAIN}/upload{}", state.next_media);
        state.next_media += 1;
        state.media.insert(
            uri.clone(),
            MediaMeta {
                size: bytes.len() as u64,
                mime: mime.to_string(),
                filename: Some(filename.to_string()),
            },
        );
        Ok(MediaRef(uri))
    }

    async fn download_media_meta(&self, media: &MediaRef) -> Result<MediaMeta, RemoteError> {
        self.state
            .lock()
            .unwrap()
            .media
            .get(&media.0)
            .cloned()
            .ok_or_else(|| RemoteError::api(404, Some("M_NOT_FOUND".into()), "no media"))
    }

    async fn account(&self, user_id: &str) -> Result<Option<Account>, RemoteError> {
        Ok(self.state.lock().unwrap().accounts.get(user_id).cloned())
    }

    async fn update_account(&self, user_id: &str, content: Value) -> Result<(), RemoteError> {
        self.maybe_fail("update_account")?;
        self.record(format!("update_account:{content}"));
        let mut state = self.state.lock().unwrap();
        let account = state
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| RemoteError::api(404, Some("M_NOT_FOUND".into()), "no account"))?;
        if let Some(displayname) = content.get("displayname").and_then(Value::as_str) {
            account.displayname = Some(displayname.to_string());
        }
        if let Some(admin) = content.get("admin").and_then(Value::as_bool) {
            account.admin = admin;
        }
        if let Some(deactivated) = content.get("deactivated").and_then(Value::as_bool) {
            account.deactivated = deactivated;
        }
        if let Some(avatar) = content.get("avatar_url").and_then(Value::as_str) {
            account.avatar_url = Some(MediaRef(avatar.to_string()));
        }
        Ok(())
    }

    async fn group_summary(&self, group_id: &str) -> Result<Option<GroupSummary>, RemoteError> {
        Ok(self.state.lock().unwrap().groups.get(group_id).cloned())
    }

    async fn create_group(&self, localpart: &str, name: &str) -> Result<String, RemoteError> {
        self.maybe_fail("create_group")?;
        self.record(format!("create_group:{localpart}"));
        let mut state = self.state.lock().unwrap();
        let group_id = format!("+{localpart}:{DOMAIN}");
        let mut summary = GroupSummary {
            group_id: group_id.clone(),
            ..Default::default()
        };
        summary.profile.name = Some(name.to_string());
        summary.users.push(ACTING.to_string());
        state.groups.insert(group_id.clone(), summary);
        Ok(group_id)
    }

    async fn update_group_profile(
        &self,
        group_id: &str,
        content: Value,
    ) -> Result<(), RemoteError> {
        self.maybe_fail("update_group_profile")?;
        self.record(format!("update_group_profile:{content}"));
        let mut state = self.state.lock().unwrap();
        let group = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| RemoteError::api(404, Some("M_NOT_FOUND".into()), "no group"))?;
        if let Some(name) = content.get("name").and_then(Value::as_str) {
            group.profile.name = Some(name.to_string());
        }
        if let Some(desc) = content.get("short_description").and_then(Value::as_str) {
            group.profile.short_description = Some(desc.to_string());
        }
        if let Some(desc) = content.get("long_description").and_then(Value::as_str) {
            group.profile.long_description = Some(desc.to_string());
        }
        if let Some(avatar) = content.get("avatar_url").and_then(Value::as_str) {
            group.profile.avatar_url = Some(MediaRef(avatar.to_string()));
        }
        Ok(())
    }

    async fn group_invite_user(&self, group_id: &str, user_id: &str) -> Result<(), RemoteError> {
        self.maybe_fail("group_invite_user")?;
        self.record(format!("group_invite:{user_id}"));
        let mut state = self.state.lock().unwrap();
        let group = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| RemoteError::api(404, Some("M_NOT_FOUND".into()), "no group"))?;
        if !group.users.contains(&user_id.to_string()) {
            group.invited_users.push(user_id.to_string());
        }
        Ok(())
    }

    async fn group_remove_user(&self, group_id: &str, user_id: &str) -> Result<(), RemoteError> {
        self.maybe_fail("group_remove_user")?;
        self.record(format!("group_remove:{user_id}"));
        let mut state = self.state.lock().unwrap();
        let group = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| RemoteError::api(404, Some("M_NOT_FOUND".into()), "no group"))?;
        group.users.retain(|u| u != user_id);
        group.invited_users.retain(|u| u != user_id);
        Ok(())
    }

    async fn group_add_room(
        &self,
        group_id: &str,
        room_id: &str,
        _visibility: &str,
    ) -> Result<(), RemoteError> {
        self.maybe_fail("group_add_room")?;
        self.record(format!("group_add_room:{room_id}"));
        let mut state = self.state.lock().unwrap();
        let group = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| RemoteError::api(404, Some("M_NOT_FOUND".into()), "no group"))?;
        if !group.rooms.contains(&room_id.to_string()) {
            group.rooms.push(room_id.to_string());
        }
        Ok(())
    }

    async fn group_remove_room(&self, group_id: &str, room_id: &str) -> Result<(), RemoteError> {
        self.maybe_fail("group_remove_room")?;
        self.record(format!("group_remove_room:{room_id}"));
        let mut state = self.state.lock().unwrap();
        let group = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| RemoteError::api(404, Some("M_NOT_FOUND".into()), "no group"))?;
        group.rooms.retain(|r| r != room_id);
        Ok(())
    }

    async fn delete_group(&self, group_id: &str) -> Result<Value, RemoteError> {
        self.maybe_fail("delete_group")?;
        self.record("delete_group");
        self.state.lock().unwrap().groups.remove(group_id);
        Ok(serde_json::json!({}))
    }
}

/// A `ResourceClient` wired to a shared mock directory.
#[allow(dead_code)]
pub fn client(directory: std::sync::Arc<MockDirectory>) -> mxsync::resources::ResourceClient {
    mxsync::resources::ResourceClient::new(
        directory,
        mxsync::ident::IdentityResolver::new(DOMAIN),
        ACTING.to_string(),
    )
}
