//! Authoritative state snapshots.
//!
//! A snapshot carries everything the server knows about one user: their
//! global permissions, every relationship in which they are the owner, and
//! their lockables. Applying a snapshot is an overwrite, never a merge.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::lockable::{Lockable, LockableSnapshot};
use crate::set::{PermissionSet, Relationship, SetKind};
use crate::types::{LockableId, UserId};

/// Full authoritative state of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullStateSnapshot {
    pub user: UserId,
    /// Monotonic server revision for this user.
    pub revision: u64,
    pub global_perms: PermissionSet,
    /// Keyed by pair: what `user` grants that pair.
    pub pair_perms: BTreeMap<UserId, Relationship>,
    pub lockables: BTreeMap<LockableId, LockableSnapshot>,
}

impl FullStateSnapshot {
    /// Revision-zero snapshot of a brand-new account.
    pub fn initial(user: UserId) -> Self {
        let lockables = crate::lockable::Slot::all()
            .map(|slot| Lockable::empty(user.clone(), slot))
            .map(|item| (item.id, item))
            .collect();
        Self {
            user,
            revision: 0,
            global_perms: PermissionSet::with_defaults(SetKind::Global),
            pair_perms: BTreeMap::new(),
            lockables,
        }
    }

    /// What `user` grants `pair`, if they are paired.
    pub fn relationship(&self, pair: &UserId) -> Option<&Relationship> {
        self.pair_perms.get(pair)
    }

    /// Check every structural invariant carried by the snapshot.
    pub fn validate(&self) -> Result<()> {
        if self.global_perms.kind() != SetKind::Global {
            return Err(CoreError::DecodingError("global set has wrong kind".into()));
        }
        for rel in self.pair_perms.values() {
            rel.check_mirror()?;
        }
        for item in self.lockables.values() {
            item.check_invariant()?;
            if item.owner != self.user {
                return Err(CoreError::MalformedLockable(item.id));
            }
        }
        Ok(())
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(Bytes::from(buf))
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}
