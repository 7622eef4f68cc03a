//! Error types for the permissions module.

use thiserror::Error;

use tether_core::{CoreError, ErrorClass, PermissionName, UserId};

use crate::hardcore::HardcoreState;

/// Errors that can occur during permission negotiation.
#[derive(Debug, Error)]
pub enum PermsError {
    /// Requester may not perform this change at all.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Requester is allowed in principle but the owner has not granted the flag.
    #[error("missing grant: {0}")]
    MissingGrant(PermissionName),

    /// The value is pinned by an active hardcore relationship.
    #[error("{name} is pinned by hardcore mode")]
    HardcoreLocked {
        name: PermissionName,
        by: Option<UserId>,
    },

    /// The permission is only writable through the hardcore channel.
    #[error("{0} is only settable through the hardcore channel")]
    HardcoreOnly(PermissionName),

    /// The relationship is not in hardcore mode.
    #[error("{owner} is not in hardcore with {pair}")]
    NotInHardcore { owner: UserId, pair: UserId },

    /// Another pair already holds this forced state.
    #[error("{state:?} is already forced by {by}")]
    AlreadyForced { state: HardcoreState, by: UserId },

    /// No relationship exists between the two users.
    #[error("{owner} is not paired with {pair}")]
    NotPaired { owner: UserId, pair: UserId },

    /// The user's global permissions are unknown locally.
    #[error("unknown user: {0}")]
    UnknownUser(UserId),

    /// Structural error from a permission set.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl PermsError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PermsError::PermissionDenied(_)
            | PermsError::MissingGrant(_)
            | PermsError::HardcoreLocked { .. }
            | PermsError::HardcoreOnly(_)
            | PermsError::NotInHardcore { .. }
            | PermsError::AlreadyForced { .. } => ErrorClass::PermissionDenied,
            PermsError::NotPaired { .. } | PermsError::UnknownUser(_) => ErrorClass::InvalidState,
            PermsError::Core(e) => e.class(),
        }
    }
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
