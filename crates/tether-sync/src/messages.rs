//! Messages exchanged across the synchronization boundary.
//!
//! Clients push optimistic changes to the authoritative side and receive
//! full-state snapshots back. Everything crosses the wire as CBOR.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use tether_core::{
    ErrorClass, ExpiryPolicy, FullStateSnapshot, LockAction, LockableId, LockableSnapshot,
    PadlockKind, Timestamp, UserId,
};
use tether_perms::PermissionChange;

use crate::error::{Result, SyncError};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 0;

/// What produced a pushed item state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockStep {
    /// A requested transition.
    Action(LockAction),
    /// The padlock's timer ran out.
    Expire,
}

/// A client-side item transition pushed for confirmation.
///
/// The authoritative side replays `step` against its own copy of the item
/// and accepts the update only if it arrives at `new_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockUpdate {
    pub owner: UserId,
    pub requester: UserId,
    pub lockable_id: LockableId,
    pub step: LockStep,
    /// Client clock when the step was evaluated.
    pub at: Timestamp,
    /// Expiry policy the client settled the item with.
    pub expiry: ExpiryPolicy,
    /// The item as the client computed it after the transition.
    pub new_state: LockableSnapshot,
    /// Padlock kind the client saw before the transition. The authoritative
    /// side rejects the update if its own record disagrees.
    pub prev_kind: PadlockKind,
}

/// Positive answer to a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Owner revision after the change was applied.
    pub revision: u64,
}

/// Sync protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMessage {
    /// Announce the sending user.
    Hello { user: UserId, protocol_version: u8 },

    /// Pair the sender with `pair`.
    Pair { pair: UserId },

    /// Remove the pairing between the sender and `pair`.
    Unpair { pair: UserId },

    /// Optimistic permission change.
    Permission(PermissionChange),

    /// Optimistic item transition.
    Lock(LockUpdate),

    /// Authoritative state of one user.
    Snapshot(FullStateSnapshot),

    /// The push was applied.
    Ack(Ack),

    /// The push was refused.
    Rejected { class: ErrorClass, reason: String },
}

impl SyncMessage {
    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| SyncError::InvalidMessage(e.to_string()))?;
        Ok(Bytes::from(buf))
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| SyncError::InvalidMessage(e.to_string()))
    }

    /// Name of the variant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::Hello { .. } => "hello",
            SyncMessage::Pair { .. } => "pair",
            SyncMessage::Unpair { .. } => "unpair",
            SyncMessage::Permission(_) => "permission",
            SyncMessage::Lock(_) => "lock",
            SyncMessage::Snapshot(_) => "snapshot",
            SyncMessage::Ack(_) => "ack",
            SyncMessage::Rejected { .. } => "rejected",
        }
    }

    /// Turn a reply into the push outcome it represents.
    pub fn into_ack(self) -> Result<Ack> {
        match self {
            SyncMessage::Ack(ack) => Ok(ack),
            SyncMessage::Rejected { class, reason } => Err(SyncError::Rejected { class, reason }),
            other => Err(SyncError::InvalidMessage(format!(
                "expected ack, got {}",
                other.kind()
            ))),
        }
    }
}
