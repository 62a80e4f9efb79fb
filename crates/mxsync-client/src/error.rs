//! Error type for remote directory operations.

use thiserror::Error;

/// A failed remote operation.
///
/// Every fallible [`RemoteDirectory`](crate::RemoteDirectory) call returns
/// this type. API rejections keep the HTTP status and the Matrix `errcode`
/// so callers can match on them instead of inspecting response shapes.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The request never produced a usable response (DNS, TLS, timeout...).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The homeserver answered with a non-success status.
    #[error("remote API error ({status}{}): {message}", .errcode.as_deref().map(|c| format!(" {c}")).unwrap_or_default())]
    Api {
        /// HTTP status code.
        status: u16,
        /// Matrix error code (`M_NOT_FOUND`, `M_ROOM_IN_USE`, ...) if the
        /// body carried one.
        errcode: Option<String>,
        /// Human-readable message from the server.
        message: String,
    },

    /// The response decoded but did not carry the expected fields.
    #[error("unexpected response shape: {0}")]
    Shape(String),
}

impl RemoteError {
    /// Build an API error from a status and a decoded Matrix error body.
    pub fn api(status: u16, errcode: Option<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            errcode,
            message: message.into(),
        }
    }

    /// HTTP status of the failure, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Shape(_) => None,
        }
    }

    /// Whether the failure is a plain 404 / `M_NOT_FOUND`.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Api { status, errcode, .. } => {
                *status == 404 || errcode.as_deref() == Some("M_NOT_FOUND")
            }
            _ => false,
        }
    }

    /// Matrix error code, if any.
    pub fn errcode(&self) -> Option<&str> {
        match self {
            Self::Api { errcode, .. } => errcode.as_deref(),
            _ => None,
        }
    }
}
