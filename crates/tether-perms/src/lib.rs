//! # Tether Permissions
//!
//! Who may change which permission, and how.
//!
//! ## Overview
//!
//! Permissions live in a [`PermissionStore`]: one global set per user and
//! one [`Relationship`](tether_core::Relationship) per direction of every
//! pairing. The [`PermissionNegotiator`] is the only writer. It checks the
//! requester against the store and turns every accepted write into a
//! [`PermissionChange`] that can be pushed to the authoritative side and
//! replayed there under the same rules.
//!
//! ## Channels
//!
//! - **Standard**: owner-managed globals, pair grants, and edit access.
//!   A pair may flip a grant only while the owner has given it edit access
//!   to that grant.
//! - **Hardcore**: flags that are never delegable. Only the owner changes
//!   them; a pair in hardcore uses them to force states onto the owner.
//!
//! ## Usage
//!
//! ```rust
//! use tether_core::{PermissionName, UserId};
//! use tether_perms::{PermissionNegotiator, PermissionStore};
//!
//! let alice = UserId::new("alice");
//! let bob = UserId::new("bob");
//! let mut store = PermissionStore::new();
//! store.establish_pair(&alice, &bob);
//!
//! let neg = PermissionNegotiator::local(alice.clone());
//! neg.set_pair_permission(&mut store, &alice, &bob, PermissionName::ApplyGags, true.into(), &alice)
//!     .unwrap();
//! assert!(store.grant_bool(&alice, &bob, PermissionName::ApplyGags));
//! ```

pub mod error;
pub mod hardcore;
pub mod negotiator;
pub mod store;

pub use error::{PermsError, Result};
pub use hardcore::{active_forced_states, enabler_of, pinned_by, HardcoreState};
pub use negotiator::{
    ChangeTarget, PermissionChange, PermissionNegotiator, UpdateDirection, WriteScope,
};
pub use store::PermissionStore;
