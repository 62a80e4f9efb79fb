//! JSON payloads printed to stdout.
//!
//! One document per invocation: a success outcome or a failure payload.
//! The failure payload still carries every change entry accumulated before
//! the error, so an operator can see what was actually applied.

use crate::changes::ChangeLog;
use crate::error::SyncError;
use serde::Serialize;
use serde_json::Value;

/// Successful reconciliation report.
#[derive(Debug, Serialize)]
pub struct Outcome {
    /// Canonical current state of the resource after the run.
    pub resource: Value,
    pub changed: bool,
    pub changed_fields: ChangeLog,
}

impl Outcome {
    pub fn new(resource: Value, changed_fields: ChangeLog) -> Self {
        Self {
            resource,
            changed: !changed_fields.is_empty(),
            changed_fields,
        }
    }
}

/// Failure report: error kind and message plus the partial change record.
#[derive(Debug, Serialize)]
pub struct Failure {
    pub error: &'static str,
    pub msg: String,
    pub changed: bool,
    pub changed_fields: ChangeLog,
}

impl Failure {
    pub fn new(err: &SyncError, changed_fields: ChangeLog) -> Self {
        Self {
            error: err.error_code(),
            msg: err.to_string(),
            changed: !changed_fields.is_empty(),
            changed_fields,
        }
    }
}

/// Render a payload to a JSON string.
pub fn render<T: Serialize>(payload: &T, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(payload)
    } else {
        serde_json::to_string(payload)
    }
}
