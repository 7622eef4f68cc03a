//! # Tether
//!
//! Permission-gated locks over a synchronized, per-pair permission model.
//!
//! ## Overview
//!
//! Every user owns a fixed set of item slots (three gag layers and one
//! restraint set). Each slot can hold content and carry a padlock. Paired
//! users may act on each other's items as far as the owner's grants allow:
//!
//! - **Permissions**: global flags per user, plus a set per ordered pair
//!   mirrored by an edit-access set
//! - **Padlocks**: ten kinds, from a plain lock to timers, passwords and
//!   locks reserved for the owner or the assigner
//! - **Hardcore**: forced states an enabler can place on an owner who
//!   opted in, revoked the moment the owner leaves hardcore
//! - **Sync**: optimistic local writes, confirmed or overridden by
//!   authoritative snapshots
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tether::{Client, ClientConfig};
//! use tether::core::{ContentRef, GagLayer, LockAction, Slot, UserId};
//! use tether::store::MemoryStore;
//! use tether::sync::MemoryHub;
//!
//! async fn example() -> tether::Result<()> {
//!     let hub = MemoryHub::new();
//!     let gateway = hub.connect(UserId::new("alice"));
//!     let mut client = Client::new(gateway, MemoryStore::new(), ClientConfig::default())?;
//!
//!     let me = client.local_user().clone();
//!     let slot = Slot::Gag(GagLayer::Inner);
//!     client
//!         .transition(&me, slot, LockAction::apply(ContentRef::gag("Ball")), tether::now_millis())
//!         .await?;
//!     client.process_snapshots().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `tether::core` - Values, permission sets, padlocks and the lock authority
//! - `tether::perms` - Permission store, negotiator and hardcore rules
//! - `tether::store` - Snapshot persistence (memory and SQLite)
//! - `tether::sync` - Gateway trait, wire messages and reconciliation

pub mod client;
pub mod config;
pub mod error;

// Re-export component crates
pub use tether_core as core;
pub use tether_perms as perms;
pub use tether_store as store;
pub use tether_sync as sync;

// Re-export main types for convenience
pub use client::{now_millis, Client, Freshness, LockRequest, TickReport};
pub use config::ClientConfig;
pub use error::{ClientError, Result};

// Re-export commonly used core types
pub use tether_core::{
    ContentRef, ErrorClass, FullStateSnapshot, GagLayer, LockAction, LockError, Lockable,
    PadlockKind, PermissionName, PermissionValue, Slot, UserId,
};
pub use tether_perms::HardcoreState;
