//! Account reconciliation.
//!
//! Accounts ride the Synapse admin v2 user API and are the one resource
//! kind without create-on-demand: converging an absent account is an
//! error, not a registration. Deactivation stands in for deletion and is
//! idempotent.

use crate::changes::{ChangeLog, Entry};
use crate::config::{AccountManifest, StateGoal};
use crate::error::{SyncError, SyncResult};
use crate::media::MediaSync;
use crate::output::{Failure, Outcome};
use crate::resources::{branch, join_branches, to_value, Branch, ResourceClient};
use mxsync_client::Account;
use serde_json::{json, Value};
use tracing::info;

/// Reconciles one account against its manifest.
pub struct AccountReconciler<'a> {
    client: &'a ResourceClient,
    mxid: String,
}

impl<'a> AccountReconciler<'a> {
    pub fn new(client: &'a ResourceClient, login: &str) -> Self {
        Self {
            client,
            mxid: client.resolver().user_id(login),
        }
    }

    pub async fn reconcile(
        &self,
        manifest: &AccountManifest,
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
        manifest: &AccountManifest,
        check: bool,
        log: &mut ChangeLog,
    ) -> SyncResult<Value> {
        let account = self.client.directory().account(&self.mxid).await?;

        if check {
            return Ok(account
                .as_ref()
                .map(account_value)
                .unwrap_or_else(|| json!({})));
        }

        match (manifest.state, account) {
            // Deactivating what never existed is a successful no-op.
            (StateGoal::Absent | StateGoal::Deactivated, None) => Ok(json!({})),
            (StateGoal::Absent | StateGoal::Deactivated, Some(account)) => {
                if account.deactivated {
                    return Ok(account_value(&account));
                }
                info!(user = %self.mxid, "deactivating account");
                self.client
                    .directory()
                    .update_account(&self.mxid, json!({"deactivated": true}))
                    .await?;
                log.record("deactivated", Entry::scalar(false, true));
                Ok(account_value(&self.reload().await?))
            }
            (StateGoal::Present, None) => Err(SyncError::NotManaged(format!(
                "account {} does not exist; registration is not managed here",
                self.mxid
            ))),
            (StateGoal::Present, Some(account)) => self.converge(manifest, account, log).await,
            (StateGoal::Archived, _) => Err(SyncError::Validation(
                "accounts do not support state = \"archived\"".into(),
            )),
        }
    }

    async fn reload(&self) -> SyncResult<Account> {
        self.client
            .directory()
            .account(&self.mxid)
            .await?
            .ok_or_else(|| {
                SyncError::NotManaged(format!(
                    "account {} vanished during reconciliation",
                    self.mxid
                ))
            })
    }

    async fn converge(
        &self,
        manifest: &AccountManifest,
        account: Account,
        log: &mut ChangeLog,
    ) -> SyncResult<Value> {
        let mut branches: Vec<Branch<'_>> = Vec::new();

        if let Some(displayname) = &manifest.displayname {
            if Some(displayname) != account.displayname.as_ref() {
                branches.push(self.field_branch(
                    "displayname",
                    json!({"displayname": displayname}),
                    Entry::scalar(&account.displayname, displayname),
                ));
            }
        }
        if let Some(admin) = manifest.admin {
            if admin != account.admin {
                branches.push(self.field_branch(
                    "admin",
                    json!({"admin": admin}),
                    Entry::scalar(account.admin, admin),
                ));
            }
        }
        if let Some(source) = &manifest.avatar {
            branches.push(self.avatar_branch(source, &account));
        }

        join_branches(branches, log).await?;

        Ok(account_value(&self.reload().await?))
    }

    fn field_branch(&self, field: &'static str, content: Value, entry: Entry) -> Branch<'_> {
        branch(async move {
            self.client
                .directory()
                .update_account(&self.mxid, content)
                .await?;
            Ok(vec![(field.to_string(), entry)])
        })
    }

    fn avatar_branch(&self, source: &str, account: &Account) -> Branch<'_> {
        let source = source.to_string();
        let current = account.avatar_url.clone();
        branch(async move {
            let media = MediaSync::new(self.client.directory());
            let Some(uploaded) = media.upload_if_new(&source, current.as_ref()).await? else {
                return Ok(Vec::new());
            };
            self.client
                .directory()
                .update_account(&self.mxid, json!({"avatar_url": uploaded.0.as_str()}))
                .await?;
            Ok(vec![(
                "avatar".to_string(),
                Entry::scalar(current.as_ref(), &uploaded),
            )])
        })
    }
}

/// Account snapshot for the output payload, with a readable creation time
/// alongside the raw timestamp.
fn account_value(account: &Account) -> Value {
    let mut value = to_value(account);
    if let (Some(obj), Some(ts)) = (value.as_object_mut(), account.creation_ts) {
        if let Some(created) = chrono::DateTime::from_timestamp_millis(ts) {
            obj.insert("created_at".to_string(), Value::String(created.to_rfc3339()));
        }
    }
    value
}
