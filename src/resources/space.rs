//! Space reconciliation.
//!
//! A space is a room with `m.space` creation content; children and the
//! optional parent are plain state events keyed by room id. Membership is
//! invite-only here: the manifest lists users who must be in the space,
//! and nobody is removed for being unlisted.

use crate::changes::{ChangeLog, Entry};
use crate::config::{SpaceManifest, StateGoal};
use crate::error::{SyncError, SyncResult};
use crate::media::MediaSync;
use crate::output::{Failure, Outcome};
use crate::resources::{branch, join_branches, to_value, Branch, ResourceClient};
use mxsync_client::{CreateRoomSpec, RoomSnapshot};
use serde_json::{json, Value};
use tracing::info;

/// Reconciles one space against its manifest.
pub struct SpaceReconciler<'a> {
    client: &'a ResourceClient,
    /// The manifest's identifier: a bare localpart or a `!x:y` room id.
    localpart: String,
}

impl<'a> SpaceReconciler<'a> {
    pub fn new(client: &'a ResourceClient, localpart: &str) -> Self {
        Self {
            client,
            localpart: localpart.to_string(),
        }
    }

    pub async fn reconcile(
        &self,
        manifest: &SpaceManifest,
        check: bool,
    ) -> Result<Outcome, Failure> {
        let mut log = ChangeLog::new();
        match self.run(manifest, check, &mut log).await {
            Ok(resource) => Ok(Outcome::new(resource, log)),
            Err(err) => Err(Failure::new(&err, log)),
        }
    }

    async fn run(
        &self,
        manifest: &SpaceManifest,
        check: bool,
        log: &mut ChangeLog,
    ) -> SyncResult<Value> {
        let snapshot = match self.locate().await? {
            Some(id) => self.client.directory().room_snapshot(&id).await?,
            None => None,
        };

        if check {
            return Ok(snapshot.as_ref().map(to_value).unwrap_or_else(|| json!({})));
        }

        match (manifest.state, snapshot) {
            (StateGoal::Absent, None) => Ok(json!({})),
            (StateGoal::Absent, Some(snap)) => {
                info!(space = %snap.room_id, "deleting space");
                let resp = self
                    .client
                    .directory()
                    .delete_room(&snap.room_id, false, false)
                    .await?;
                log.record("delete", Entry::marker(resp));
                Ok(to_value(&snap))
            }
            (StateGoal::Present, None) => self.create(manifest, log).await,
            (StateGoal::Present, Some(snap)) => self.converge(manifest, snap, log).await,
            (goal, _) => Err(SyncError::Validation(format!(
                "spaces do not support state = {goal:?}"
            ))),
        }
    }

    /// Find the space: room ids pass through, bare localparts go through
    /// the alias directory.
    async fn locate(&self) -> SyncResult<Option<String>> {
        if self.localpart.starts_with('!') {
            return Ok(Some(self.localpart.clone()));
        }
        let alias = self.client.resolver().room_alias(&self.localpart);
        Ok(self.client.directory().resolve_alias(&alias).await?)
    }

    async fn reload(&self, room_id: &str) -> SyncResult<RoomSnapshot> {
        self.client
            .directory()
            .room_snapshot(room_id)
            .await?
            .ok_or_else(|| {
                SyncError::NotManaged(format!("space {room_id} vanished during reconciliation"))
            })
    }

    async fn create(&self, manifest: &SpaceManifest, log: &mut ChangeLog) -> SyncResult<Value> {
        let name = manifest.name.clone().ok_or_else(|| {
            SyncError::Validation(format!(
                "space `{}` requires `name` to be created",
                self.localpart
            ))
        })?;
        if self.localpart.starts_with('!') {
            return Err(SyncError::Validation(format!(
                "cannot create `{}` from a bare room id; provide a localpart",
                self.localpart
            )));
        }

        let spec = CreateRoomSpec {
            alias_localpart: Some(self.localpart.clone()),
            name: Some(name),
            topic: manifest.topic.clone(),
            visibility: Some(manifest.visibility.clone().unwrap_or_else(|| "public".into())),
            preset: None,
            federate: true,
            invite: Vec::new(),
            power_level_content_override: None,
            // Spaces work best with room version 9.
            creation_content: Some(json!({"type": "m.space", "room_version": "9"})),
        };
        info!(space = %self.localpart, "creating space");
        let room_id = self.client.directory().create_room(&spec).await?;
        log.record("created", Entry::marker(true));

        let snap = self.reload(&room_id).await?;
        self.converge(manifest, snap, log).await
    }

    async fn converge(
        &self,
        manifest: &SpaceManifest,
        snap: RoomSnapshot,
        log: &mut ChangeLog,
    ) -> SyncResult<Value> {
        let room_id = snap.room_id.clone();

        // Invite-only membership, applied before the fan-out.
        if let Some(members) = &manifest.members {
            let mut invited = Vec::new();
            for login in members {
                let user_id = self.client.resolver().user_id(login);
                if snap.members.contains_key(&user_id) || invited.contains(&user_id) {
                    continue;
                }
                self.client.directory().invite(&room_id, &user_id).await?;
                invited.push(user_id);
            }
            if !invited.is_empty() {
                let old: Vec<&String> = snap.members.keys().collect();
                let mut new: Vec<String> = snap.members.keys().cloned().collect();
                new.extend(invited.iter().cloned());
                log.record(
                    "members",
                    Entry::set(invited.clone(), Vec::new(), old, new),
                );
            }
        }

        let mut branches: Vec<Branch<'_>> = Vec::new();
        if let Some(name) = &manifest.name {
            if Some(name) != snap.name.as_ref() {
                branches.push(self.state_branch(
                    &room_id,
                    "name",
                    "m.room.name",
                    "",
                    json!({"name": name}),
                    Entry::scalar(&snap.name, name),
                ));
            }
        }
        if let Some(topic) = &manifest.topic {
            if Some(topic) != snap.topic.as_ref() {
                branches.push(self.state_branch(
                    &room_id,
                    "topic",
                    "m.room.topic",
                    "",
                    json!({"topic": topic}),
                    Entry::scalar(&snap.topic, topic),
                ));
            }
        }
        if let Some(source) = &manifest.avatar {
            branches.push(self.avatar_branch(source, &snap));
        }
        if let Some(rooms) = &manifest.rooms {
            branches.push(self.children_branch(rooms, &snap));
        }
        if let Some(parent) = &manifest.parent {
            let parent_id = self.client.resolver().space_id(parent);
            if !snap.parents.contains(&parent_id) {
                let entry = Entry::scalar(snap.parents.first(), &parent_id);
                branches.push(self.state_branch(
                    &room_id,
                    "parent",
                    "m.space.parent",
                    &parent_id,
                    json!({"via": [self.client.resolver().domain()], "canonical": true}),
                    entry,
                ));
            }
        }

        join_branches(branches, log).await?;

        Ok(to_value(&self.reload(&room_id).await?))
    }

    fn state_branch(
        &self,
        room_id: &str,
        field: &'static str,
        event_type: &'static str,
        state_key: &str,
        content: Value,
        entry: Entry,
    ) -> Branch<'_> {
        let room_id = room_id.to_string();
        let state_key = state_key.to_string();
        branch(async move {
            self.client
                .directory()
                .put_room_state(&room_id, event_type, &state_key, content)
                .await?;
            Ok(vec![(field.to_string(), entry)])
        })
    }

    fn avatar_branch(&self, source: &str, snap: &RoomSnapshot) -> Branch<'_> {
        let source = source.to_string();
        let room_id = snap.room_id.clone();
        let current = snap.avatar.clone();
        branch(async move {
            let media = MediaSync::new(self.client.directory());
            let Some(uploaded) = media.upload_if_new(&source, current.as_ref()).await? else {
                return Ok(Vec::new());
            };
            self.client
                .directory()
                .put_room_state(&room_id, "m.room.avatar", "", json!({"url": uploaded.0.as_str()}))
                .await?;
            Ok(vec![(
                "avatar".to_string(),
                Entry::scalar(current.as_ref(), &uploaded),
            )])
        })
    }

    /// Link missing child rooms. Add-only, like the member roster.
    fn children_branch(&self, rooms: &[String], snap: &RoomSnapshot) -> Branch<'_> {
        let rooms = rooms.to_vec();
        let room_id = snap.room_id.clone();
        let existing = snap.children.clone();
        branch(async move {
            let mut added = Vec::new();
            for name in &rooms {
                let child = self.resolve_room(name).await?;
                if existing.contains(&child) || added.contains(&child) {
                    continue;
                }
                self.client
                    .directory()
                    .put_room_state(
                        &room_id,
                        "m.space.child",
                        &child,
                        json!({"via": [self.client.resolver().domain()], "suggested": true}),
                    )
                    .await?;
                added.push(child);
            }
            if added.is_empty() {
                return Ok(Vec::new());
            }
            let mut new = existing.clone();
            new.extend(added.iter().cloned());
            Ok(vec![(
                "rooms".to_string(),
                Entry::set(added, Vec::new(), existing, new),
            )])
        })
    }

    async fn resolve_room(&self, name: &str) -> SyncResult<String> {
        let alias = self.client.resolver().room_alias(name);
        if alias.starts_with('!') {
            return Ok(alias);
        }
        self.client
            .directory()
            .resolve_alias(&alias)
            .await?
            .ok_or_else(|| SyncError::NotManaged(format!("could not resolve room `{name}`")))
    }
}
