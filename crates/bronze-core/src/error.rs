//! Error types for platform operations.
//!
//! The dispatcher never talks to the chat platform directly; every outbound
//! call goes through a [`Responder`](crate::Responder). Responder
//! implementations report failures with [`ApiError`].

use thiserror::Error;

use crate::permissions::Permissions;

/// Errors returned by [`Responder`](crate::Responder) calls.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The platform client is not connected.
    #[error("platform client is not connected")]
    NotConnected,

    /// The call did not complete in time.
    #[error("platform call timed out")]
    Timeout,

    /// The bot lacks the permissions needed for the call.
    #[error("missing permissions: {missing:?}")]
    MissingPermissions {
        /// The bits that were required but not granted.
        missing: Permissions,
    },

    /// The platform rejected the call.
    #[error("platform error ({code}): {message}")]
    Platform {
        /// Platform-specific error code.
        code: i64,
        /// Human-readable message from the platform.
        message: String,
    },

    /// The referenced channel, message or member does not exist.
    #[error("unknown {entity} '{id}'")]
    Unknown {
        /// Kind of entity that was looked up (e.g. "channel").
        entity: &'static str,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Creates an [`ApiError::Other`] from any message.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(format!("serialization error: {err}"))
    }
}

/// Result type for responder calls.
pub type ApiResult<T> = Result<T, ApiError>;
