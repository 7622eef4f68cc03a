//! StateStore trait: the abstract interface for local persistence.
//!
//! The client persists the last authoritative snapshot of every user it
//! tracks, plus the local user's own global permissions, so a restart can
//! come back up with a (stale) view before the first live snapshot arrives.

use async_trait::async_trait;
use tether_core::{FullStateSnapshot, PermissionSet, UserId};

use crate::error::Result;

/// Result of saving a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// The snapshot replaced whatever was stored.
    Saved,
    /// A newer revision is already stored; nothing was written.
    Stale {
        /// Revision currently stored for the user.
        stored: u64,
    },
}

/// Async interface for snapshot persistence.
///
/// # Design Notes
///
/// - **One snapshot per user**: saving replaces the previous one.
/// - **Monotonic**: a snapshot older than the stored revision is ignored
///   and reported as `Stale`; equal revisions overwrite.
/// - **Validated on load**: records that fail structural validation are an
///   `InvalidData` error, never silently returned.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist a user's authoritative snapshot.
    async fn save_snapshot(&self, snapshot: &FullStateSnapshot) -> Result<SaveResult>;

    /// Load one user's snapshot.
    async fn load_snapshot(&self, user: &UserId) -> Result<Option<FullStateSnapshot>>;

    /// Load every stored snapshot, ordered by user.
    async fn load_snapshots(&self) -> Result<Vec<FullStateSnapshot>>;

    /// Forget a user's snapshot. Returns whether one was stored.
    async fn delete_snapshot(&self, user: &UserId) -> Result<bool>;

    /// Persist a user's own global permissions.
    async fn save_global_defaults(&self, user: &UserId, perms: &PermissionSet) -> Result<()>;

    /// Load a user's own global permissions.
    async fn load_global_defaults(&self, user: &UserId) -> Result<Option<PermissionSet>>;
}
