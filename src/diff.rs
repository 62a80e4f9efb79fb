//! Membership and power-level convergence.
//!
//! The planner is pure: given the current and desired member maps it
//! computes who to invite, who to remove and the final level map, without
//! touching the network. Reconcilers apply the plan in a fixed order —
//! invites, then removals, then one bulk power-level update — so a resource
//! never transiently has zero privileged members.

use crate::changes::Entry;
use crate::error::{SyncError, SyncResult};
use mxsync_client::{PowerLevelDefaults, LEVEL_ADMIN};
use std::collections::BTreeMap;

/// Safety rules applied while planning membership.
#[derive(Debug, Clone, Copy)]
pub struct MembershipPolicy {
    /// Keep the acting identity in the desired set at admin level, whether
    /// or not the manifest lists it.
    pub ensure_actor: bool,
    /// Keep every current admin-level member at admin level even when the
    /// manifest omits it.
    pub preserve_admins: bool,
}

impl MembershipPolicy {
    /// Room policy: self-preservation plus the admin floor.
    pub const ROOM: Self = Self {
        ensure_actor: true,
        preserve_admins: true,
    };

    /// Plain roster policy (groups, spaces): self-preservation only; the
    /// roster carries no levels for a floor to act on.
    pub const ROSTER: Self = Self {
        ensure_actor: true,
        preserve_admins: false,
    };
}

/// A computed convergence plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipPlan {
    /// Ids present in desired but not current, in map order.
    pub to_invite: Vec<String>,
    /// Ids present in current but not desired, in map order.
    pub to_remove: Vec<String>,
    /// The full final id→level map to apply in one bulk update.
    pub levels: BTreeMap<String, i64>,
    /// Snapshot the plan was computed against.
    pub current: BTreeMap<String, i64>,
}

impl MembershipPlan {
    /// True when nothing needs to happen: no adds, no removes, no level
    /// changed. A no-op plan must issue no remote call and write no
    /// change entry.
    pub fn is_noop(&self) -> bool {
        self.levels == self.current
    }

    /// Change entry for this plan, keyed by the caller's field name.
    pub fn entry(&self) -> Entry {
        Entry::set(
            self.to_invite.clone(),
            self.to_remove.clone(),
            &self.current,
            &self.levels,
        )
    }
}

/// Compute the convergence plan for one membership map.
///
/// `desired` must already hold canonical ids (see
/// [`IdentityResolver`](crate::ident::IdentityResolver)). Plain id lists
/// are diffed by handing in a map with every value at the default level.
///
/// Fails with a policy violation when the plan would remove the acting
/// identity — reachable only when `ensure_actor` is off, since the policy
/// otherwise pins the actor into the desired set.
pub fn plan_membership(
    current: &BTreeMap<String, i64>,
    desired: &BTreeMap<String, i64>,
    acting: &str,
    policy: MembershipPolicy,
) -> SyncResult<MembershipPlan> {
    let mut target = desired.clone();
    if policy.ensure_actor {
        target.insert(acting.to_string(), LEVEL_ADMIN);
    }
    if policy.preserve_admins {
        for (id, level) in current {
            if *level == LEVEL_ADMIN {
                target.insert(id.clone(), LEVEL_ADMIN);
            }
        }
    }

    let to_remove: Vec<String> = current
        .keys()
        .filter(|id| !target.contains_key(*id))
        .cloned()
        .collect();
    let to_invite: Vec<String> = target
        .keys()
        .filter(|id| !current.contains_key(*id))
        .cloned()
        .collect();

    if to_remove.iter().any(|id| id == acting) {
        return Err(SyncError::Policy(format!(
            "desired membership would remove the acting identity {acting}"
        )));
    }

    Ok(MembershipPlan {
        to_invite,
        to_remove,
        levels: target,
        current: current.clone(),
    })
}

/// Power-level override keys whose desired value differs from the current
/// defaults. Keys the room's schema does not know are ignored, matching
/// the server's own behavior of dropping them.
pub fn changed_overrides(
    current: &PowerLevelDefaults,
    desired: &BTreeMap<String, i64>,
) -> BTreeMap<String, i64> {
    desired
        .iter()
        .filter(|(key, value)| current.get(key).is_some_and(|cur| cur != **value))
        .map(|(key, value)| (key.clone(), *value))
        .collect()
}
