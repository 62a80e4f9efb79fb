//! Per-resource reconcilers.
//!
//! Each reconciler follows the same shape: load the current snapshot,
//! take the state-machine decision (create / update / delete / no-op),
//! converge membership, fan out independent attribute branches, merge
//! their change entries, reload the snapshot and report.
//!
//! The shared pieces live here: [`ResourceClient`] (the injected directory
//! capability plus identity resolution) and the branch fan-out helper.

pub mod account;
pub mod group;
pub mod room;
pub mod send;
pub mod space;

use crate::changes::{BranchChanges, ChangeLog};
use crate::error::{SyncError, SyncResult};
use crate::ident::IdentityResolver;
use mxsync_client::RemoteDirectory;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::warn;

pub use account::AccountReconciler;
pub use group::GroupReconciler;
pub use room::RoomReconciler;
pub use space::SpaceReconciler;

/// The capability each reconciler is handed: a remote directory, the
/// identity resolver, and the canonical id the token acts as.
#[derive(Clone)]
pub struct ResourceClient {
    directory: Arc<dyn RemoteDirectory>,
    resolver: IdentityResolver,
    acting: String,
}

impl ResourceClient {
    /// Bundle a directory with a resolver. `acting` must already be a
    /// fully qualified user id (normalize logins with the resolver first).
    pub fn new(
        directory: Arc<dyn RemoteDirectory>,
        resolver: IdentityResolver,
        acting: String,
    ) -> Self {
        Self {
            directory,
            resolver,
            acting,
        }
    }

    pub fn directory(&self) -> &dyn RemoteDirectory {
        self.directory.as_ref()
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// The identity performing reconciliations. Never removed from managed
    /// memberships.
    pub fn acting(&self) -> &str {
        &self.acting
    }
}

/// One independent attribute sub-reconciliation.
pub(crate) type Branch<'a> = Pin<Box<dyn Future<Output = SyncResult<BranchChanges>> + Send + 'a>>;

/// Run all branches to completion and merge their entries.
///
/// Branch failures are isolated: siblings keep running and their entries
/// are kept. The first failure (by branch order) is returned for the
/// report; later ones are logged.
pub(crate) async fn join_branches(
    branches: Vec<Branch<'_>>,
    log: &mut ChangeLog,
) -> Result<(), SyncError> {
    let results = futures_util::future::join_all(branches).await;
    let mut first_err = None;
    for result in results {
        match result {
            Ok(entries) => log.absorb(entries),
            Err(err) => {
                if first_err.is_none() {
                    first_err = Some(err);
                } else {
                    warn!(error = %err, "additional branch failure");
                }
            }
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Box a branch future.
pub(crate) fn branch<'a, F>(fut: F) -> Branch<'a>
where
    F: Future<Output = SyncResult<BranchChanges>> + Send + 'a,
{
    Box::pin(fut)
}

/// Serialize a snapshot for the output payload.
pub(crate) fn to_value<T: serde::Serialize>(v: &T) -> serde_json::Value {
    serde_json::to_value(v).unwrap_or(serde_json::Value::Null)
}
