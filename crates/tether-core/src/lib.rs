//! # Tether Core
//!
//! Pure primitives for tether: the permission catalogue, permission sets,
//! padlocks, lockable item slots, and the lock authority.
//!
//! This crate contains no I/O, no storage, no networking. Everything here
//! is a value or a pure function over values.
//!
//! ## Key Types
//!
//! - [`PermissionName`] - Closed catalogue of every permission
//! - [`PermissionValue`] - Typed value (bool, duration, text)
//! - [`PermissionSet`] - Name to value mapping scoped to a [`SetKind`]
//! - [`Relationship`] - One direction of a pairing: grants plus edit access
//! - [`Padlock`] / [`PadlockKind`] - The lock record on an item
//! - [`Lockable`] - A fixed item slot with content and padlock
//! - [`LockAuthority`] - Decides item transitions
//! - [`FullStateSnapshot`] - Authoritative state of one user

pub mod authority;
pub mod error;
pub mod lockable;
pub mod padlock;
pub mod permission;
pub mod set;
pub mod snapshot;
pub mod types;

pub use authority::{ExpiryPolicy, LockAction, LockAuthority, MIN_TIMER_DURATION};
pub use error::{CoreError, ErrorClass, LockError, Result};
pub use lockable::{
    Category, ContentRef, GagLayer, GagType, Lockable, LockableRegistry, LockableSnapshot,
    RestraintSetId, Slot, GAG_SLOT_COUNT,
};
pub use padlock::{Padlock, PadlockKind, MAX_PASSWORD_LEN};
pub use permission::{
    PermissionChannel, PermissionDomain, PermissionName, PermissionValue, PermissionValueType,
};
pub use set::{PermissionSet, Relationship, SetKind};
pub use snapshot::FullStateSnapshot;
pub use types::{LockableId, RelationKey, Timestamp, UserId};
