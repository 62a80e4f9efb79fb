//! Group (legacy community) reconciliation.
//!
//! Groups have no power levels: membership is a plain roster converged
//! with invites and removals, and the profile is a handful of scalar
//! fields. Attached rooms are add-only — the manifest lists rooms that
//! must belong to the group, and rooms added out of band are left alone.

use crate::changes::{ChangeLog, Entry};
use crate::config::{GroupManifest, StateGoal};
use crate::diff::{plan_membership, MembershipPolicy};
use crate::error::{SyncError, SyncResult};
use crate::media::MediaSync;
use crate::output::{Failure, Outcome};
use crate::resources::{branch, join_branches, to_value, Branch, ResourceClient};
use mxsync_client::GroupSummary;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;

/// Reconciles one group against its manifest.
pub struct GroupReconciler<'a> {
    client: &'a ResourceClient,
    group_id: String,
}

impl<'a> GroupReconciler<'a> {
    pub fn new(client: &'a ResourceClient, localpart: &str) -> Self {
        Self {
            client,
            group_id: client.resolver().group_id(localpart),
        }
    }

    pub async fn reconcile(
        &self,
        manifest: &GroupManifest,
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
        manifest: &GroupManifest,
        check: bool,
        log: &mut ChangeLog,
    ) -> SyncResult<Value> {
        let summary = self.client.directory().group_summary(&self.group_id).await?;

        if check {
            return Ok(summary.as_ref().map(to_value).unwrap_or_else(|| json!({})));
        }

        match (manifest.state, summary) {
            (StateGoal::Absent, None) => Ok(json!({})),
            (StateGoal::Absent, Some(summary)) => {
                info!(group = %self.group_id, "deleting group");
                let resp = self.client.directory().delete_group(&self.group_id).await?;
                log.record("delete", Entry::marker(resp));
                Ok(to_value(&summary))
            }
            (StateGoal::Present, None) => {
                let name = manifest.name.as_deref().ok_or_else(|| {
                    SyncError::Validation(format!(
                        "group `{}` requires `name` to be created",
                        self.group_id
                    ))
                })?;
                let localpart = bare_localpart(&self.group_id);
                info!(group = %self.group_id, "creating group");
                self.client.directory().create_group(localpart, name).await?;
                log.record("created", Entry::marker(true));
                let summary = self.reload().await?;
                self.converge(manifest, summary, log).await
            }
            (StateGoal::Present, Some(summary)) => self.converge(manifest, summary, log).await,
            (goal, _) => Err(SyncError::Validation(format!(
                "groups do not support state = {goal:?}"
            ))),
        }
    }

    async fn reload(&self) -> SyncResult<GroupSummary> {
        self.client
            .directory()
            .group_summary(&self.group_id)
            .await?
            .ok_or_else(|| {
                SyncError::NotManaged(format!(
                    "group {} vanished during reconciliation",
                    self.group_id
                ))
            })
    }

    async fn converge(
        &self,
        manifest: &GroupManifest,
        summary: GroupSummary,
        log: &mut ChangeLog,
    ) -> SyncResult<Value> {
        // Membership first; the scalar fan-out has no ordering needs of
        // its own, but every reconciler keeps the same shape.
        if let Some(members) = &manifest.members {
            let desired: BTreeMap<String, i64> = members
                .iter()
                .map(|login| (self.client.resolver().user_id(login), 0))
                .collect();
            let current: BTreeMap<String, i64> =
                summary.all_members().map(|id| (id.clone(), 0)).collect();
            let plan = plan_membership(
                &current,
                &desired,
                self.client.acting(),
                MembershipPolicy::ROSTER,
            )?;
            // Rosters carry no real levels; converged means no additions
            // and no removals.
            if !(plan.to_invite.is_empty() && plan.to_remove.is_empty()) {
                for user in &plan.to_invite {
                    self.client
                        .directory()
                        .group_invite_user(&self.group_id, user)
                        .await?;
                }
                for user in &plan.to_remove {
                    self.client
                        .directory()
                        .group_remove_user(&self.group_id, user)
                        .await?;
                }
                let old: Vec<&String> = current.keys().collect();
                let new: Vec<&String> = plan.levels.keys().collect();
                log.record(
                    "members",
                    Entry::set(plan.to_invite.clone(), plan.to_remove.clone(), old, new),
                );
            }
        }

        let mut branches: Vec<Branch<'_>> = Vec::new();
        if let Some(name) = &manifest.name {
            if Some(name) != summary.profile.name.as_ref() {
                branches.push(self.profile_branch(
                    "name",
                    json!({"name": name}),
                    to_value(&summary.profile.name),
                    to_value(name),
                ));
            }
        }
        if let Some(description) = &manifest.description {
            if Some(description) != summary.profile.short_description.as_ref() {
                branches.push(self.profile_branch(
                    "description",
                    json!({"short_description": description}),
                    to_value(&summary.profile.short_description),
                    to_value(description),
                ));
            }
        }
        if let Some(long_description) = &manifest.long_description {
            if Some(long_description) != summary.profile.long_description.as_ref() {
                branches.push(self.profile_branch(
                    "long_description",
                    json!({"long_description": long_description}),
                    to_value(&summary.profile.long_description),
                    to_value(long_description),
                ));
            }
        }
        if let Some(source) = &manifest.avatar {
            branches.push(self.avatar_branch(source, &summary));
        }
        if let Some(rooms) = &manifest.rooms {
            branches.push(self.rooms_branch(rooms, manifest, &summary));
        }

        join_branches(branches, log).await?;

        Ok(to_value(&self.reload().await?))
    }

    fn profile_branch(
        &self,
        field: &'static str,
        content: Value,
        old: Value,
        new: Value,
    ) -> Branch<'_> {
        branch(async move {
            self.client
                .directory()
                .update_group_profile(&self.group_id, content)
                .await?;
            Ok(vec![(field.to_string(), Entry::Scalar { old, new })])
        })
    }

    fn avatar_branch(&self, source: &str, summary: &GroupSummary) -> Branch<'_> {
        let source = source.to_string();
        let current = summary.profile.avatar_url.clone();
        branch(async move {
            let media = MediaSync::new(self.client.directory());
            let Some(uploaded) = media.upload_if_new(&source, current.as_ref()).await? else {
                return Ok(Vec::new());
            };
            self.client
                .directory()
                .update_group_profile(&self.group_id, json!({"avatar_url": uploaded.0.as_str()}))
                .await?;
            Ok(vec![(
                "avatar".to_string(),
                Entry::scalar(current.as_ref(), &uploaded),
            )])
        })
    }

    /// Attach missing rooms. Add-only: rooms already in the group stay,
    /// listed or not.
    fn rooms_branch(
        &self,
        rooms: &[String],
        manifest: &GroupManifest,
        summary: &GroupSummary,
    ) -> Branch<'_> {
        let rooms = rooms.to_vec();
        let existing = summary.rooms.clone();
        let visibility = manifest
            .visibility
            .clone()
            .unwrap_or_else(|| "private".into());
        branch(async move {
            let mut added = Vec::new();
            for name in &rooms {
                let room_id = self.resolve_room(name).await?;
                if existing.contains(&room_id) || added.contains(&room_id) {
                    continue;
                }
                self.client
                    .directory()
                    .group_add_room(&self.group_id, &room_id, &visibility)
                    .await?;
                added.push(room_id);
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

    /// Room alias or id → room id.
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

fn bare_localpart(group_id: &str) -> &str {
    group_id
        .strip_prefix('+')
        .and_then(|rest| rest.split(':').next())
        .unwrap_or(group_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localpart_extraction() {
        assert_eq!(bare_localpart("+team:example.com"), "team");
        assert_eq!(bare_localpart("team"), "team");
    }
}
