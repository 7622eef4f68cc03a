//! Error types for the sync module.

use thiserror::Error;

use tether_core::{ErrorClass, UserId};

/// Errors that can occur at the synchronization boundary.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The authoritative side refused the push.
    #[error("rejected ({class:?}): {reason}")]
    Rejected { class: ErrorClass, reason: String },

    /// Message could not be encoded or decoded.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// The user is not known to the authoritative side.
    #[error("unknown user: {0}")]
    UnknownUser(UserId),

    /// The gateway has been shut down.
    #[error("gateway closed")]
    Closed,
}

impl SyncError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::Rejected { class, .. } => *class,
            SyncError::InvalidMessage(_) | SyncError::TransportError(_) | SyncError::Closed => {
                ErrorClass::Transport
            }
            SyncError::UnknownUser(_) => ErrorClass::InvalidState,
        }
    }

    /// Whether the push was seen and refused, as opposed to lost.
    pub fn is_rejection(&self) -> bool {
        matches!(self, SyncError::Rejected { .. })
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
