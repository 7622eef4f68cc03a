//! # Tether Testkit
//!
//! Testing utilities for tether.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: paired clients on a shared in-memory hub, and plain
//!   permission stores with users already paired
//! - **Generators**: Proptest strategies for permission values, padlocks,
//!   item actions and snapshots
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use tether_testkit::generators::{lockable, lock_action};
//!
//! proptest! {
//!     #[test]
//!     fn transitions_keep_padlocks_well_formed(item in lockable(), action in lock_action()) {
//!         // ...
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use tether_testkit::fixtures::PairFixture;
//!
//! async fn example() {
//!     let mut fixture = PairFixture::new().await.unwrap();
//!     fixture.settle().await.unwrap();
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{paired_store, random_uid, PairFixture, TestClient};
pub use generators::{lock_action, lockable, permission_value_for, snapshot, user_id};
