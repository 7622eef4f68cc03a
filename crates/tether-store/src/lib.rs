//! # Tether Store
//!
//! Local persistence for tether. Provides a trait-based interface for
//! snapshot storage with SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`StateStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`SaveResult`] - Result of saving a snapshot
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tether_core::{FullStateSnapshot, UserId};
//! use tether_store::{SqliteStore, StateStore};
//!
//! async fn example() {
//!     let store = SqliteStore::open("tether.db").unwrap();
//!     let snapshot = FullStateSnapshot::initial(UserId::new("alice"));
//!     store.save_snapshot(&snapshot).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Authoritative only**: only snapshots received from the server are
//!   stored, never optimistic local state.
//! - **Monotonic**: an older revision never replaces a newer one.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{SaveResult, StateStore};
