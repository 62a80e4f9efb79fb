//! The change record of a reconciliation run.
//!
//! Every applied delta lands here under its field name. Sub-reconciliation
//! branches each return their own entries and the orchestrating reconciler
//! merges them; keys are disjoint by construction (one key per field), so
//! the merge never conflicts and no locking exists anywhere. Non-emptiness
//! is the sole truth for "changed".

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A single recorded delta.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Entry {
    /// A scalar attribute changed.
    Scalar { old: Value, new: Value },
    /// A set-valued field converged.
    Set {
        added: Vec<String>,
        removed: Vec<String>,
        old: Value,
        new: Value,
    },
    /// A bare marker (`created`, `delete` responses...).
    Marker(Value),
}

impl Entry {
    /// Scalar `{old, new}` entry from any serializable values.
    pub fn scalar<O: Serialize, N: Serialize>(old: O, new: N) -> Self {
        Self::Scalar {
            old: to_value(old),
            new: to_value(new),
        }
    }

    /// Set-valued `{added, removed, old, new}` entry.
    pub fn set<O: Serialize, N: Serialize>(
        added: Vec<String>,
        removed: Vec<String>,
        old: O,
        new: N,
    ) -> Self {
        Self::Set {
            added,
            removed,
            old: to_value(old),
            new: to_value(new),
        }
    }

    /// Bare marker entry.
    pub fn marker<V: Serialize>(value: V) -> Self {
        Self::Marker(to_value(value))
    }
}

fn to_value<V: Serialize>(v: V) -> Value {
    serde_json::to_value(v).unwrap_or(Value::Null)
}

/// Entries produced by one sub-reconciliation branch.
pub type BranchChanges = Vec<(String, Entry)>;

/// Field-keyed record of every delta applied during one run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ChangeLog {
    entries: BTreeMap<String, Entry>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anything changed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record one delta under its field name.
    pub fn record(&mut self, field: impl Into<String>, entry: Entry) {
        let field = field.into();
        debug_assert!(
            !self.entries.contains_key(&field),
            "duplicate change key: {field}"
        );
        self.entries.insert(field, entry);
    }

    /// Merge entries returned by a branch.
    pub fn absorb(&mut self, branch: BranchChanges) {
        for (field, entry) in branch {
            self.record(field, entry);
        }
    }

    /// Look up an entry (used by tests and the output snapshot).
    pub fn get(&self, field: &str) -> Option<&Entry> {
        self.entries.get(field)
    }
}
