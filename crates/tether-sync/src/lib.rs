//! # Tether Sync
//!
//! The boundary between a client's optimistic state and the authoritative
//! state held elsewhere.
//!
//! ## Overview
//!
//! A client applies permission and item changes locally, records them in a
//! [`PendingLedger`] and pushes them through a [`SyncGateway`]. The
//! authoritative side re-validates each push and answers with an [`Ack`] or
//! a rejection, then broadcasts a [`FullStateSnapshot`] of every user the
//! change touched. Snapshots always win: reconciling one confirms the
//! matching ledger entries and drops the rest as [`SyncConflict`]s.
//!
//! ## Key Properties
//!
//! - **Overwrite, never merge**: a snapshot replaces the user's state.
//! - **Monotonic**: revisions only grow per user.
//! - **Re-validated**: the authoritative side runs every permission change
//!   through the same negotiation rules the client used.
//!
//! ## Message Flow
//!
//! ```text
//! Client                         Authoritative side
//!   |-------- Permission / Lock ------->|
//!   |<------- Ack / Rejected -----------|
//!   |<------- Snapshot (owner) ---------|
//!   |<------- Snapshot (each pair) -----|
//! ```
//!
//! [`FullStateSnapshot`]: tether_core::FullStateSnapshot

pub mod error;
pub mod gateway;
pub mod messages;
pub mod reconcile;

pub use error::{Result, SyncError};
pub use gateway::{memory::MemoryGateway, memory::MemoryHub, SnapshotCallback, SyncGateway};
pub use messages::{Ack, LockStep, LockUpdate, SyncMessage, PROTOCOL_VERSION};
pub use reconcile::{PendingChange, PendingLedger, ReconcileReport, SyncConflict};
