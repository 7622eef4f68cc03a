//! Lockables: fixed item slots that can be filled and padlocked.
//!
//! Every user owns exactly [`GAG_SLOT_COUNT`] gag slots and one restraint
//! slot for the lifetime of the account. Only the content and the padlock
//! of a slot ever change.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::padlock::Padlock;
use crate::types::{LockableId, UserId};

/// Number of gag layers per user.
pub const GAG_SLOT_COUNT: usize = 3;

/// Content category of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Gag,
    RestraintSet,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Gag => f.write_str("gag"),
            Category::RestraintSet => f.write_str("restraint set"),
        }
    }
}

/// Gag layer, innermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GagLayer {
    Inner,
    Middle,
    Outer,
}

impl GagLayer {
    pub const ALL: [GagLayer; GAG_SLOT_COUNT] = [GagLayer::Inner, GagLayer::Middle, GagLayer::Outer];

    pub const fn index(self) -> usize {
        match self {
            GagLayer::Inner => 0,
            GagLayer::Middle => 1,
            GagLayer::Outer => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// One of a user's fixed slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Slot {
    Gag(GagLayer),
    RestraintSet,
}

impl Slot {
    /// Every slot a user owns.
    pub fn all() -> impl Iterator<Item = Slot> {
        GagLayer::ALL
            .into_iter()
            .map(Slot::Gag)
            .chain(std::iter::once(Slot::RestraintSet))
    }

    pub fn category(self) -> Category {
        match self {
            Slot::Gag(_) => Category::Gag,
            Slot::RestraintSet => Category::RestraintSet,
        }
    }

    /// Stable key used for id derivation.
    pub fn as_key(self) -> String {
        match self {
            Slot::Gag(layer) => format!("gag/{}", layer.index()),
            Slot::RestraintSet => "restraint-set".to_string(),
        }
    }
}

/// A gag item, by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GagType(pub String);

impl GagType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// A restraint set defined in the owner's wardrobe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RestraintSetId(pub String);

impl RestraintSetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// What fills a slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentRef {
    Gag(GagType),
    RestraintSet(RestraintSetId),
}

impl ContentRef {
    pub fn gag(name: impl Into<String>) -> Self {
        ContentRef::Gag(GagType::new(name))
    }

    pub fn restraint_set(id: impl Into<String>) -> Self {
        ContentRef::RestraintSet(RestraintSetId::new(id))
    }

    pub fn category(&self) -> Category {
        match self {
            ContentRef::Gag(_) => Category::Gag,
            ContentRef::RestraintSet(_) => Category::RestraintSet,
        }
    }
}

/// An item slot with its content and padlock.
///
/// Values are immutable snapshots: transitions produce a new `Lockable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockable {
    pub id: LockableId,
    pub owner: UserId,
    pub slot: Slot,
    pub content: Option<ContentRef>,
    pub padlock: Padlock,
}

/// The wire form of a lockable.
pub type LockableSnapshot = Lockable;

impl Lockable {
    /// An empty, unlocked slot.
    pub fn empty(owner: UserId, slot: Slot) -> Self {
        Self {
            id: LockableId::derive(&owner, slot),
            owner,
            slot,
            content: None,
            padlock: Padlock::none(),
        }
    }

    pub fn category(&self) -> Category {
        self.slot.category()
    }

    pub fn is_locked(&self) -> bool {
        self.padlock.is_locked()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none()
    }

    /// Check the structural invariants of the item.
    pub fn check_invariant(&self) -> Result<()> {
        self.padlock.check_invariant()?;
        if self.is_locked() && self.content.is_none() {
            return Err(CoreError::MalformedPadlock("locked slot without content"));
        }
        if let Some(content) = &self.content {
            if content.category() != self.category() {
                return Err(CoreError::MalformedLockable(self.id));
            }
        }
        if self.id != LockableId::derive(&self.owner, self.slot) {
            return Err(CoreError::MalformedLockable(self.id));
        }
        Ok(())
    }
}

/// Arena of every lockable the local client knows about, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockableRegistry {
    items: BTreeMap<LockableId, Lockable>,
}

impl LockableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `owner`'s fixed slots if they don't exist yet.
    pub fn register_user(&mut self, owner: &UserId) {
        for slot in Slot::all() {
            let item = Lockable::empty(owner.clone(), slot);
            self.items.entry(item.id).or_insert(item);
        }
    }

    pub fn get(&self, id: &LockableId) -> Option<&Lockable> {
        self.items.get(id)
    }

    pub fn get_slot(&self, owner: &UserId, slot: Slot) -> Option<&Lockable> {
        self.items.get(&LockableId::derive(owner, slot))
    }

    /// Replace one item. The item must belong to a registered slot.
    pub fn put(&mut self, item: Lockable) -> Result<Option<Lockable>> {
        item.check_invariant()?;
        if !self.items.contains_key(&item.id) {
            return Err(CoreError::UnknownLockable(item.id));
        }
        Ok(self.items.insert(item.id, item))
    }

    /// Overwrite all of `owner`'s items with authoritative ones.
    ///
    /// Slots missing from `items` reset to empty.
    pub fn replace_user(&mut self, owner: &UserId, items: impl IntoIterator<Item = Lockable>) {
        self.remove_user(owner);
        self.register_user(owner);
        for item in items {
            if &item.owner == owner
                && self.items.contains_key(&item.id)
                && item.check_invariant().is_ok()
            {
                self.items.insert(item.id, item);
            }
        }
    }

    pub fn remove_user(&mut self, owner: &UserId) {
        self.items.retain(|_, item| &item.owner != owner);
    }

    pub fn owned_by<'a>(&'a self, owner: &'a UserId) -> impl Iterator<Item = &'a Lockable> + 'a {
        self.items.values().filter(move |item| &item.owner == owner)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lockable> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
