//! Identifier newtypes shared by every tether crate.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::lockable::Slot;

/// Wall-clock instant in Unix milliseconds.
pub type Timestamp = i64;

/// A user identity as issued by the synchronization server (a UID string).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Create a user id from anything string-like.
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    /// Borrow the raw UID.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty UID, used as "nobody" in text-valued permissions.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A 32-byte lockable identifier.
///
/// Derived from Blake3(owner || slot). Slots have fixed cardinality per
/// user, so every client derives the same id for the same item without
/// coordination.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LockableId(pub [u8; 32]);

impl LockableId {
    /// Derive the id of `owner`'s lockable in `slot`.
    pub fn derive(owner: &UserId, slot: Slot) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"tether-lockable-v0:");
        hasher.update(owner.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(slot.as_key().as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Leading eight bytes in hex, enough to tell items apart in logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Debug for LockableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockableId({})", self.short())
    }
}

impl fmt::Display for LockableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

/// Key of one direction of a pairing: what `owner` grants to `pair`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationKey {
    pub owner: UserId,
    pub pair: UserId,
}

impl RelationKey {
    pub fn new(owner: UserId, pair: UserId) -> Self {
        Self { owner, pair }
    }

    /// The same pairing seen from the other side.
    pub fn mirrored(&self) -> Self {
        Self {
            owner: self.pair.clone(),
            pair: self.owner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockable::GagLayer;

    #[test]
    fn test_lockable_id_renders_short_hex() {
        let id = LockableId::derive(&UserId::new("alice"), Slot::RestraintSet);
        assert_eq!(id.to_string().len(), 16);
        assert_eq!(format!("{id:?}"), format!("LockableId({id})"));
    }

    #[test]
    fn test_lockable_id_distinct_per_slot_and_owner() {
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        let a0 = LockableId::derive(&alice, Slot::Gag(GagLayer::Inner));
        let a1 = LockableId::derive(&alice, Slot::Gag(GagLayer::Middle));
        let b0 = LockableId::derive(&bob, Slot::Gag(GagLayer::Inner));

        assert_ne!(a0, a1);
        assert_ne!(a0, b0);
        assert_eq!(a0, LockableId::derive(&alice, Slot::Gag(GagLayer::Inner)));
    }

    #[test]
    fn test_relation_key_mirrored() {
        let key = RelationKey::new("owner".into(), "pair".into());
        let back = key.mirrored().mirrored();
        assert_eq!(key, back);
        assert_eq!(key.mirrored().owner, UserId::new("pair"));
    }
}
