//! Permission store: arena of every permission set the client knows about.
//!
//! Sets are keyed by user (globals) and by `(owner, pair)` (relationships)
//! and reached only by lookup, so reconciling from a snapshot is a plain
//! overwrite of the affected keys.

use std::collections::{BTreeMap, HashMap};

use tether_core::{
    FullStateSnapshot, PermissionName, PermissionSet, PermissionValue, RelationKey, Relationship,
    SetKind, UserId,
};

use crate::error::{PermsError, Result};
use crate::negotiator::{ChangeTarget, PermissionChange};

/// Every global set and relationship known locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionStore {
    globals: HashMap<UserId, PermissionSet>,
    relations: HashMap<RelationKey, Relationship>,
}

impl PermissionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `user` default global permissions if they have none.
    pub fn register_user(&mut self, user: &UserId) {
        self.globals
            .entry(user.clone())
            .or_insert_with(|| PermissionSet::with_defaults(SetKind::Global));
    }

    pub fn globals(&self, user: &UserId) -> Option<&PermissionSet> {
        self.globals.get(user)
    }

    pub fn relationship(&self, owner: &UserId, pair: &UserId) -> Option<&Relationship> {
        self.relations
            .get(&RelationKey::new(owner.clone(), pair.clone()))
    }

    /// What `owner` allows `requester` to do, if they are paired.
    pub fn grants(&self, owner: &UserId, requester: &UserId) -> Option<&PermissionSet> {
        self.relationship(owner, requester).map(|rel| &rel.perms)
    }

    pub fn is_paired(&self, owner: &UserId, pair: &UserId) -> bool {
        self.relationship(owner, pair).is_some()
    }

    pub fn in_hardcore(&self, owner: &UserId, pair: &UserId) -> bool {
        self.relationship(owner, pair)
            .is_some_and(Relationship::in_hardcore)
    }

    /// Pairs `owner` is currently in hardcore with.
    pub fn hardcore_pairs<'a>(&'a self, owner: &'a UserId) -> impl Iterator<Item = &'a UserId> + 'a {
        self.relations
            .iter()
            .filter(move |(key, rel)| &key.owner == owner && rel.in_hardcore())
            .map(|(key, _)| &key.pair)
    }

    /// Every pair `owner` grants permissions to, sorted.
    pub fn pairs_of(&self, owner: &UserId) -> Vec<UserId> {
        let mut pairs: Vec<UserId> = self
            .relations
            .keys()
            .filter(|key| &key.owner == owner)
            .map(|key| key.pair.clone())
            .collect();
        pairs.sort();
        pairs
    }

    /// Create both directions of a pairing with default values.
    ///
    /// Existing directions are left untouched.
    pub fn establish_pair(&mut self, a: &UserId, b: &UserId) {
        self.register_user(a);
        self.register_user(b);
        for key in [
            RelationKey::new(a.clone(), b.clone()),
            RelationKey::new(b.clone(), a.clone()),
        ] {
            self.relations.entry(key).or_default();
        }
    }

    /// Delete both directions of a pairing.
    pub fn remove_pair(&mut self, a: &UserId, b: &UserId) -> bool {
        let key = RelationKey::new(a.clone(), b.clone());
        let forward = self.relations.remove(&key).is_some();
        let backward = self.relations.remove(&key.mirrored()).is_some();
        forward || backward
    }

    /// Forget everything about `user`.
    pub fn remove_user(&mut self, user: &UserId) {
        self.globals.remove(user);
        self.relations
            .retain(|key, _| &key.owner != user && &key.pair != user);
    }

    /// Overwrite `snapshot.user`'s globals and owned relationships.
    ///
    /// Relationships the snapshot no longer lists are deleted.
    pub fn replace_user(&mut self, snapshot: &FullStateSnapshot) {
        let user = &snapshot.user;
        self.globals
            .insert(user.clone(), snapshot.global_perms.clone());
        self.relations.retain(|key, _| &key.owner != user);
        for (pair, rel) in &snapshot.pair_perms {
            self.relations
                .insert(RelationKey::new(user.clone(), pair.clone()), rel.clone());
        }
    }

    /// Overwrite only `user`'s globals. Sets of another kind are refused.
    pub fn replace_globals(&mut self, user: &UserId, globals: PermissionSet) -> bool {
        if globals.kind() != SetKind::Global {
            return false;
        }
        self.globals.insert(user.clone(), globals);
        true
    }

    /// Globals and owned relationships of `user`, in snapshot form.
    pub fn export_user(&self, user: &UserId) -> Option<(PermissionSet, BTreeMap<UserId, Relationship>)> {
        let globals = self.globals.get(user)?.clone();
        let pairs = self
            .relations
            .iter()
            .filter(|(key, _)| &key.owner == user)
            .map(|(key, rel)| (key.pair.clone(), rel.clone()))
            .collect();
        Some((globals, pairs))
    }

    /// The value a change targets, as currently stored.
    pub fn current_value(&self, change: &PermissionChange) -> Option<&PermissionValue> {
        match change.target {
            ChangeTarget::Global => self.globals(&change.owner)?.get(change.name),
            ChangeTarget::PairPerm => {
                let rel = self.relationship(&change.owner, change.pair.as_ref()?)?;
                rel.perms.get(change.name)
            }
            ChangeTarget::EditAccess => {
                let rel = self.relationship(&change.owner, change.pair.as_ref()?)?;
                rel.access.get(change.name)
            }
        }
    }

    /// Write a validated change.
    pub(crate) fn apply_change(&mut self, change: &PermissionChange) -> Result<()> {
        let value = change.value.clone();
        match change.target {
            ChangeTarget::Global => {
                self.globals
                    .get_mut(&change.owner)
                    .ok_or_else(|| PermsError::UnknownUser(change.owner.clone()))?
                    .set(change.name, value)?;
            }
            ChangeTarget::PairPerm => {
                self.relationship_mut(&change.owner, change.pair.as_ref())?
                    .perms
                    .set(change.name, value)?;
            }
            ChangeTarget::EditAccess => {
                self.relationship_mut(&change.owner, change.pair.as_ref())?
                    .access
                    .set(change.name, value)?;
            }
        }
        Ok(())
    }

    fn relationship_mut(&mut self, owner: &UserId, pair: Option<&UserId>) -> Result<&mut Relationship> {
        let pair = pair.ok_or_else(|| {
            PermsError::PermissionDenied("pair change without a pair".into())
        })?;
        self.relations
            .get_mut(&RelationKey::new(owner.clone(), pair.clone()))
            .ok_or_else(|| PermsError::NotPaired {
                owner: owner.clone(),
                pair: pair.clone(),
            })
    }

    /// Check every structural invariant across the store.
    pub fn check_invariants(&self) -> Result<()> {
        for rel in self.relations.values() {
            rel.check_mirror()?;
        }
        Ok(())
    }

    /// Read a boolean grant directly.
    pub fn grant_bool(&self, owner: &UserId, pair: &UserId, name: PermissionName) -> bool {
        self.grants(owner, pair).is_some_and(|g| g.get_bool(name))
    }
}
