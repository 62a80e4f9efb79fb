//! Room reconciliation.
//!
//! The richest resource kind: rooms carry power levels, directory
//! visibility, encryption and an avatar alongside membership. Convergence
//! order matters — the acting identity is elevated and membership is
//! durably applied before the attribute fan-out, because the power-level
//! override branch reads the post-membership privilege map.

use crate::changes::{ChangeLog, Entry};
use crate::config::{RoomManifest, StateGoal};
use crate::diff::{changed_overrides, plan_membership, MembershipPlan, MembershipPolicy};
use crate::error::{SyncError, SyncResult};
use crate::media::MediaSync;
use crate::output::{Failure, Outcome};
use crate::resources::{branch, join_branches, to_value, Branch, ResourceClient};
use mxsync_client::{CreateRoomSpec, PowerLevels, RoomSnapshot, LEVEL_ADMIN};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Encryption algorithm enabled by `encrypt = true`.
const ENCRYPTION_ALGORITHM: &str = "m.megolm.v1.aes-sha2";

/// Reconciles one room against its manifest.
pub struct RoomReconciler<'a> {
    client: &'a ResourceClient,
    /// Fully qualified alias, or a bare room id when the manifest gave one.
    alias: String,
}

impl<'a> RoomReconciler<'a> {
    pub fn new(client: &'a ResourceClient, alias: &str) -> Self {
        Self {
            client,
            alias: client.resolver().room_alias(alias),
        }
    }

    /// Run the full reconciliation and produce the report payload.
    pub async fn reconcile(&self, manifest: &RoomManifest, check: bool) -> Result<Outcome, Failure> {
        let mut log = ChangeLog::new();
        match self.run(manifest, check, &mut log).await {
            Ok(resource) => Ok(Outcome::new(resource, log)),
            Err(err) => Err(Failure::new(&err, log)),
        }
    }

    async fn run(
        &self,
        manifest: &RoomManifest,
        check: bool,
        log: &mut ChangeLog,
    ) -> SyncResult<Value> {
        let room_id = self.locate().await?;
        let snapshot = match &room_id {
            Some(id) => self.client.directory().room_snapshot(id).await?,
            None => None,
        };

        if check {
            return Ok(snapshot.as_ref().map(to_value).unwrap_or_else(|| json!({})));
        }

        match (manifest.state, snapshot) {
            // Deleting what is already gone is a successful no-op.
            (StateGoal::Absent | StateGoal::Archived, None) => Ok(json!({})),
            (StateGoal::Absent, Some(snap)) => {
                self.delete(&snap, manifest.block, manifest.purge, log).await
            }
            // Archiving seals the room but keeps its content.
            (StateGoal::Archived, Some(snap)) => self.delete(&snap, true, false, log).await,
            (StateGoal::Present, None) => self.create(manifest, log).await,
            (StateGoal::Present, Some(snap)) => self.update(manifest, snap, log).await,
            (StateGoal::Deactivated, _) => Err(SyncError::Validation(
                "rooms do not support state = \"deactivated\"".into(),
            )),
        }
    }

    /// Resolve the manifest's alias to a room id, if the room exists.
    async fn locate(&self) -> SyncResult<Option<String>> {
        if self.alias.starts_with('!') {
            return Ok(Some(self.alias.clone()));
        }
        Ok(self.client.directory().resolve_alias(&self.alias).await?)
    }

    async fn reload(&self, room_id: &str) -> SyncResult<RoomSnapshot> {
        self.client
            .directory()
            .room_snapshot(room_id)
            .await?
            .ok_or_else(|| {
                SyncError::NotManaged(format!("room {room_id} vanished during reconciliation"))
            })
    }

    async fn delete(
        &self,
        snap: &RoomSnapshot,
        block: bool,
        purge: bool,
        log: &mut ChangeLog,
    ) -> SyncResult<Value> {
        info!(room = %snap.room_id, block, purge, "deleting room");
        let resp = self
            .client
            .directory()
            .delete_room(&snap.room_id, block, purge)
            .await?;
        log.record("delete", Entry::marker(resp));
        Ok(to_value(snap))
    }

    async fn create(&self, manifest: &RoomManifest, log: &mut ChangeLog) -> SyncResult<Value> {
        let name = manifest.name.clone().ok_or_else(|| {
            SyncError::Validation(format!("room `{}` requires `name` to be created", self.alias))
        })?;
        let localpart = self
            .alias
            .strip_prefix('#')
            .and_then(|rest| rest.split(':').next())
            .ok_or_else(|| {
                SyncError::Validation(format!(
                    "cannot create `{}` from a bare room id; provide an alias",
                    self.alias
                ))
            })?;

        let desired = self.desired_members(manifest);
        let invitees: Vec<String> = desired
            .keys()
            .filter(|id| *id != self.client.acting())
            .cloned()
            .collect();

        let spec = CreateRoomSpec {
            alias_localpart: Some(localpart.to_string()),
            name: Some(name),
            topic: manifest.topic.clone(),
            visibility: Some(manifest.visibility.clone().unwrap_or_else(|| "private".into())),
            preset: manifest.preset.clone(),
            federate: manifest.federate.unwrap_or(false),
            invite: invitees,
            power_level_content_override: manifest.power_level_override.as_ref().map(to_value),
            creation_content: None,
        };
        info!(alias = %self.alias, "creating room");
        let room_id = match self.client.directory().create_room(&spec).await {
            Ok(id) => id,
            Err(e) if e.errcode() == Some("M_ROOM_IN_USE") => {
                return Err(SyncError::Validation(format!(
                    "can't create room `{}`: already exists",
                    self.alias
                )))
            }
            Err(e) => return Err(e.into()),
        };
        log.record("created", Entry::marker(true));

        let snap = self.reload(&room_id).await?;
        if manifest.members.is_some() {
            let desired = self.desired_members(manifest);
            let current = current_members(&snap);
            let plan = plan_membership(
                &current,
                &desired,
                self.client.acting(),
                MembershipPolicy::ROOM,
            )?;
            if !plan.is_noop() {
                self.apply_membership_plan(&room_id, &plan, &snap, log).await?;
            }
        }
        let snap = self.reload(&room_id).await?;

        // Name, topic, visibility and overrides were part of the create
        // body; only encryption and the avatar remain.
        let mut branches: Vec<Branch<'_>> = Vec::new();
        if let Some(b) = self.encryption_branch(manifest, &snap) {
            branches.push(b);
        }
        if let Some(b) = self.avatar_branch(manifest, &snap) {
            branches.push(b);
        }
        join_branches(branches, log).await?;

        Ok(to_value(&self.reload(&room_id).await?))
    }

    async fn update(
        &self,
        manifest: &RoomManifest,
        snap: RoomSnapshot,
        log: &mut ChangeLog,
    ) -> SyncResult<Value> {
        let room_id = snap.room_id.clone();

        // Precondition checks: fail before any mutation is issued.
        if manifest.encrypt == Some(false) && snap.encrypted {
            return Err(SyncError::Policy(
                "once enabled, encryption cannot be disabled".into(),
            ));
        }
        let plan = match &manifest.members {
            Some(_) => {
                let desired = self.desired_members(manifest);
                let current = current_members(&snap);
                Some(plan_membership(
                    &current,
                    &desired,
                    self.client.acting(),
                    MembershipPolicy::ROOM,
                )?)
            }
            None => None,
        };

        // The acting identity needs admin power before it can rewrite
        // membership or privileged state.
        let mut mutated = false;
        if snap.power_levels.level_of(self.client.acting()) < LEVEL_ADMIN {
            self.client
                .directory()
                .make_room_admin(&room_id, self.client.acting())
                .await?;
            log.record("room_admin", Entry::marker(self.client.acting()));
            mutated = true;
        }

        if let Some(plan) = plan {
            if !plan.is_noop() {
                self.apply_membership_plan(&room_id, &plan, &snap, log).await?;
                mutated = true;
            }
        }

        // Later branches read the post-membership privilege map.
        let snap = if mutated { self.reload(&room_id).await? } else { snap };

        let mut branches: Vec<Branch<'_>> = Vec::new();
        if let Some(name) = &manifest.name {
            if Some(name) != snap.name.as_ref() {
                branches.push(self.scalar_state_branch(
                    &room_id,
                    "name",
                    "m.room.name",
                    json!({"name": name}),
                    to_value(&snap.name),
                    to_value(name),
                ));
            }
        }
        if let Some(topic) = &manifest.topic {
            if Some(topic) != snap.topic.as_ref() {
                branches.push(self.scalar_state_branch(
                    &room_id,
                    "topic",
                    "m.room.topic",
                    json!({"topic": topic}),
                    to_value(&snap.topic),
                    to_value(topic),
                ));
            }
        }
        if let Some(b) = self.encryption_branch(manifest, &snap) {
            branches.push(b);
        }
        if let Some(b) = self.avatar_branch(manifest, &snap) {
            branches.push(b);
        }
        if let Some(visibility) = &manifest.visibility {
            branches.push(self.visibility_branch(&room_id, visibility));
        }
        if let Some(overrides) = &manifest.power_level_override {
            branches.push(self.overrides_branch(&room_id, &snap, overrides));
        }

        join_branches(branches, log).await?;

        Ok(to_value(&self.reload(&room_id).await?))
    }

    /// Apply a non-noop plan: invites, then removals, then one bulk
    /// power-level update carrying the full new level map.
    async fn apply_membership_plan(
        &self,
        room_id: &str,
        plan: &MembershipPlan,
        snap: &RoomSnapshot,
        log: &mut ChangeLog,
    ) -> SyncResult<()> {
        debug!(
            room = %room_id,
            invites = plan.to_invite.len(),
            removals = plan.to_remove.len(),
            "applying membership plan"
        );
        for user in &plan.to_invite {
            // The acting identity is already in the room (or was just
            // elevated into it); it only needs its level entry.
            if user == self.client.acting() {
                continue;
            }
            self.client.directory().invite(room_id, user).await?;
        }
        for user in &plan.to_remove {
            self.client.directory().kick(room_id, user).await?;
        }
        let content = to_value(&PowerLevels {
            users: plan.levels.clone(),
            defaults: snap.power_levels.defaults.clone(),
        });
        self.client
            .directory()
            .put_room_state(room_id, "m.room.power_levels", "", content)
            .await?;
        log.record("members", plan.entry());
        Ok(())
    }

    /// Desired membership with canonical ids.
    fn desired_members(&self, manifest: &RoomManifest) -> BTreeMap<String, i64> {
        manifest
            .members
            .as_ref()
            .map(|members| {
                members
                    .iter()
                    .map(|(login, level)| (self.client.resolver().user_id(login), *level))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn scalar_state_branch(
        &self,
        room_id: &str,
        field: &'static str,
        event_type: &'static str,
        content: Value,
        old: Value,
        new: Value,
    ) -> Branch<'_> {
        let room_id = room_id.to_string();
        branch(async move {
            self.client
                .directory()
                .put_room_state(&room_id, event_type, "", content)
                .await?;
            Ok(vec![(field.to_string(), Entry::Scalar { old, new })])
        })
    }

    fn encryption_branch(
        &self,
        manifest: &RoomManifest,
        snap: &RoomSnapshot,
    ) -> Option<Branch<'_>> {
        if manifest.encrypt != Some(true) || snap.encrypted {
            return None;
        }
        let room_id = snap.room_id.clone();
        Some(branch(async move {
            self.client
                .directory()
                .put_room_state(
                    &room_id,
                    "m.room.encryption",
                    "",
                    json!({"algorithm": ENCRYPTION_ALGORITHM}),
                )
                .await?;
            Ok(vec![("encryption".to_string(), Entry::scalar(false, true))])
        }))
    }

    fn avatar_branch(&self, manifest: &RoomManifest, snap: &RoomSnapshot) -> Option<Branch<'_>> {
        let source = manifest.avatar.clone()?;
        let room_id = snap.room_id.clone();
        let current = snap.avatar.clone();
        Some(branch(async move {
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
        }))
    }

    fn visibility_branch(&self, room_id: &str, desired: &str) -> Branch<'_> {
        let room_id = room_id.to_string();
        let desired = desired.to_string();
        branch(async move {
            let current = self.client.directory().room_visibility(&room_id).await?;
            if current == desired {
                return Ok(Vec::new());
            }
            self.client
                .directory()
                .set_room_visibility(&room_id, &desired)
                .await?;
            Ok(vec![(
                "visibility".to_string(),
                Entry::scalar(current, desired),
            )])
        })
    }

    fn overrides_branch(
        &self,
        room_id: &str,
        snap: &RoomSnapshot,
        desired: &BTreeMap<String, i64>,
    ) -> Branch<'_> {
        let room_id = room_id.to_string();
        let power_levels = snap.power_levels.clone();
        let desired = desired.clone();
        branch(async move {
            let changed = changed_overrides(&power_levels.defaults, &desired);
            if changed.is_empty() {
                return Ok(Vec::new());
            }
            let old: BTreeMap<String, i64> = changed
                .keys()
                .filter_map(|key| power_levels.defaults.get(key).map(|v| (key.clone(), v)))
                .collect();

            // One full power-levels event: patched defaults plus the
            // post-membership users map, so the override PUT never
            // regresses membership levels.
            let mut defaults = power_levels.defaults.clone();
            for (key, value) in &changed {
                defaults.set(key, *value);
            }
            let content = to_value(&PowerLevels {
                users: power_levels.users.clone(),
                defaults,
            });
            self.client
                .directory()
                .put_room_state(&room_id, "m.room.power_levels", "", content)
                .await?;
            Ok(vec![(
                "power_level_override".to_string(),
                Entry::scalar(old, changed),
            )])
        })
    }
}

/// Current membership as an id→level map: members from the member events,
/// levels from the power-level event.
fn current_members(snap: &RoomSnapshot) -> BTreeMap<String, i64> {
    snap.members
        .keys()
        .map(|user| (user.clone(), snap.power_levels.level_of(user)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_members_merges_levels() {
        let mut snap = RoomSnapshot {
            room_id: "!r:x".into(),
            ..Default::default()
        };
        snap.members.insert("@a:x".into(), "join".into());
        snap.members.insert("@b:x".into(), "invite".into());
        snap.power_levels.users.insert("@a:x".into(), 100);
        let current = current_members(&snap);
        assert_eq!(current.get("@a:x"), Some(&100));
        assert_eq!(current.get("@b:x"), Some(&0));
    }
}
