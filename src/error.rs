//! Unified error handling for mxsync.
//!
//! One taxonomy covers every reconciliation failure; each variant maps to
//! a stable code used in the JSON failure payload.

use mxsync_client::RemoteError;
use thiserror::Error;

/// Errors that can occur during a reconciliation run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A manifest is missing a field required for the requested transition,
    /// or carries a malformed value. Raised before any remote mutation.
    #[error("validation error: {0}")]
    Validation(String),

    /// An update was requested against an absent resource that has no
    /// create-on-demand policy (plain user accounts).
    #[error("not managed: {0}")]
    NotManaged(String),

    /// A requested change violates a safety rule: self-lockout, demoting an
    /// admin-floor member, or disabling encryption.
    #[error("policy violation: {0}")]
    Policy(String),

    /// A remote call failed; carries status code and server message.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Unsupported or undecodable image input.
    #[error("media error: {0}")]
    Media(String),
}

impl SyncError {
    /// Get a static error code string for the failure payload.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotManaged(_) => "not_managed",
            Self::Policy(_) => "policy_violation",
            Self::Remote(_) => "remote_error",
            Self::Media(_) => "media_error",
        }
    }
}

/// Result type for reconciliation steps.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(
            SyncError::Validation("x".into()).error_code(),
            "validation_error"
        );
        assert_eq!(SyncError::Policy("x".into()).error_code(), "policy_violation");
        assert_eq!(
            SyncError::Remote(RemoteError::api(500, None, "boom")).error_code(),
            "remote_error"
        );
    }

    #[test]
    fn remote_errors_convert() {
        fn fails() -> SyncResult<()> {
            Err(RemoteError::api(403, Some("M_FORBIDDEN".into()), "no"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(SyncError::Remote(_))));
    }
}
