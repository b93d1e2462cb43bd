//! Portal error types.
//!
//! `PortalError` is the caller-visible rejection taxonomy. Each variant maps to
//! a stable numeric code for the façade in front of the portal; internal
//! details are logged server-side and never exposed through
//! [`PortalError::client_message`].

use thiserror::Error;

/// Portal error type.
///
/// Maps to façade error codes:
/// - `InvalidSignature`, `InvalidOrUsedToken`: `UNAUTHORIZED` (2)
/// - `NotJoined`: `NOT_FOUND` (4)
/// - `AlreadyJoined`: `CONFLICT` (5)
/// - `TokenStore`, `Config`, `Internal`: `INTERNAL_ERROR` (6)
/// - `NoControllerAvailable`: `CAPACITY_EXCEEDED` (7)
/// - `RemoteOperationFailed`: `REMOTE_ERROR` (8)
#[derive(Debug, Error)]
pub enum PortalError {
    /// Token signature does not match the configured signing key.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// Token does not exist in the store or was already consumed.
    #[error("Invalid or used token")]
    InvalidOrUsedToken,

    /// Participant already holds a session on this portal.
    #[error("Participant already in room: {0}")]
    AlreadyJoined(String),

    /// Participant has no session on this portal.
    #[error("Participant has NOT joined: {0}")]
    NotJoined(String),

    /// The cluster could not name a controller for the room.
    #[error("No controller available: {0}")]
    NoControllerAvailable(String),

    /// The owning controller rejected or failed the forwarded operation.
    /// Carries the controller's reason verbatim.
    #[error("{0}")]
    RemoteOperationFailed(String),

    /// Token store backend failure (not a token problem).
    #[error("Token store error: {0}")]
    TokenStore(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PortalError {
    /// Returns the façade error code for this error.
    pub fn error_code(&self) -> i32 {
        match self {
            PortalError::InvalidSignature | PortalError::InvalidOrUsedToken => 2, // UNAUTHORIZED
            PortalError::NotJoined(_) => 4,     // NOT_FOUND
            PortalError::AlreadyJoined(_) => 5, // CONFLICT
            PortalError::TokenStore(_) | PortalError::Config(_) | PortalError::Internal(_) => {
                6 // INTERNAL_ERROR
            }
            PortalError::NoControllerAvailable(_) => 7, // CAPACITY_EXCEEDED
            PortalError::RemoteOperationFailed(_) => 8, // REMOTE_ERROR
        }
    }

    /// Returns a client-safe error message.
    ///
    /// Remote failures are passed through unchanged; the controller's reason is
    /// part of the operation's result, not an internal detail of the portal.
    pub fn client_message(&self) -> String {
        match self {
            PortalError::InvalidSignature => "Invalid token signature".to_string(),
            PortalError::InvalidOrUsedToken => "Invalid or used token".to_string(),
            PortalError::AlreadyJoined(_) => "Participant already in room".to_string(),
            PortalError::NotJoined(_) => "Participant has NOT joined".to_string(),
            PortalError::NoControllerAvailable(_) => {
                "No room controller available, please try again".to_string()
            }
            PortalError::RemoteOperationFailed(reason) => reason.clone(),
            PortalError::TokenStore(_) | PortalError::Config(_) | PortalError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }

    /// Short label used for the `status` dimension of operation metrics.
    pub fn status_label(&self) -> &'static str {
        match self {
            PortalError::InvalidSignature => "invalid_signature",
            PortalError::InvalidOrUsedToken => "invalid_token",
            PortalError::AlreadyJoined(_) => "already_joined",
            PortalError::NotJoined(_) => "not_joined",
            PortalError::NoControllerAvailable(_) => "no_controller",
            PortalError::RemoteOperationFailed(_) => "remote_error",
            PortalError::TokenStore(_) | PortalError::Config(_) | PortalError::Internal(_) => {
                "internal_error"
            }
        }
    }
}
