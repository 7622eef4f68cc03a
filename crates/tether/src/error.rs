//! Error types for the Client.

use thiserror::Error;

use tether_core::{CoreError, ErrorClass, LockError, Slot, UserId};
use tether_perms::PermsError;
use tether_store::StoreError;
use tether_sync::SyncError;

/// Errors that can occur during Client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The lock authority refused a transition.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// Permission error.
    #[error("permission error: {0}")]
    Permission(#[from] PermsError),

    /// Structural error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// No such item slot is known locally.
    #[error("no {slot:?} slot known for {owner}")]
    UnknownLockable { owner: UserId, slot: Slot },

    /// The request queue is full.
    #[error("request queue full ({0} pending)")]
    QueueFull(usize),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl ClientError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ClientError::Lock(e) => e.class(),
            ClientError::Permission(e) => e.class(),
            ClientError::Core(e) => e.class(),
            ClientError::Store(e) => e.class(),
            ClientError::Sync(e) => e.class(),
            ClientError::UnknownLockable { .. }
            | ClientError::QueueFull(_)
            | ClientError::Config(_) => ErrorClass::InvalidState,
        }
    }
}

/// Result type for Client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
