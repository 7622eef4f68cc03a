//! Error types for tether core.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::permission::{PermissionName, PermissionValueType};
use crate::set::SetKind;
use crate::types::LockableId;

/// How a caller should react to an error.
///
/// Every error in the workspace maps onto one of these classes. None of
/// them is fatal to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Requester lacks a needed flag. Surface, don't retry.
    PermissionDenied,
    /// The local view is stale. Resync.
    InvalidState,
    /// Re-prompt for the password.
    PasswordMismatch,
    /// Clamp and re-offer.
    DurationOutOfRange,
    /// Explain; no override exists.
    Irreversible,
    /// Explain; only the item owner may do this.
    OwnerRequired,
    /// Authoritative state disagreed. Reconciled silently.
    SyncConflict,
    /// The synchronization boundary failed. Retry later.
    Transport,
    /// The persistence collaborator failed.
    Storage,
}

/// Structural errors on permission sets and item records.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown permission: {0}")]
    UnknownPermission(String),

    #[error("unknown padlock kind: {0}")]
    UnknownPadlock(String),

    #[error("{name} does not belong in a {kind:?} set")]
    WrongDomain { name: PermissionName, kind: SetKind },

    #[error("{name} holds {expected:?} values, got {got:?}")]
    TypeMismatch {
        name: PermissionName,
        expected: PermissionValueType,
        got: PermissionValueType,
    },

    #[error("edit-access mirror broken for {0}")]
    MirrorBroken(PermissionName),

    #[error("malformed padlock: {0}")]
    MalformedPadlock(&'static str),

    #[error("malformed lockable: {0}")]
    MalformedLockable(LockableId),

    #[error("unknown lockable: {0}")]
    UnknownLockable(LockableId),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

impl CoreError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::InvalidState
    }
}

/// Rejections from the lock authority.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("item is locked; unlock it first")]
    NotUnlocked,

    #[error("item is not locked")]
    NotLocked,

    #[error("slot is empty")]
    EmptySlot,

    #[error("a padlock kind other than None is required")]
    NoPadlockKind,

    #[error("missing permission: {0}")]
    InsufficientPermission(PermissionName),

    #[error("password does not match")]
    PasswordMismatch,

    #[error("invalid password: {0}")]
    InvalidPassword(&'static str),

    #[error("duration out of range: must be within {min:?}..={max:?}")]
    DurationOutOfRange { min: Duration, max: Duration },

    #[error("this padlock can only be released by its timer")]
    IrreversibleLock,

    #[error("only the item owner may do this")]
    OwnerRequired,

    #[error("content does not fit this slot")]
    CategoryMismatch,
}

impl LockError {
    pub fn class(&self) -> ErrorClass {
        match self {
            LockError::NotUnlocked
            | LockError::NotLocked
            | LockError::EmptySlot
            | LockError::NoPadlockKind => ErrorClass::InvalidState,
            LockError::InsufficientPermission(_) | LockError::CategoryMismatch => {
                ErrorClass::PermissionDenied
            }
            LockError::PasswordMismatch | LockError::InvalidPassword(_) => {
                ErrorClass::PasswordMismatch
            }
            LockError::DurationOutOfRange { .. } => ErrorClass::DurationOutOfRange,
            LockError::IrreversibleLock => ErrorClass::Irreversible,
            LockError::OwnerRequired => ErrorClass::OwnerRequired,
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
