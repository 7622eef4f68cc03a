//! Permission negotiation.
//!
//! The negotiator decides who may write which permission and produces a
//! [`PermissionChange`] for every accepted write. Whether the change is
//! also written locally depends on the negotiator's [`WriteScope`].

use serde::{Deserialize, Serialize};

use tether_core::{PermissionChannel, PermissionName, PermissionValue, UserId};

use crate::error::{PermsError, Result};
use crate::hardcore::{self, HardcoreState};
use crate::store::PermissionStore;

/// Which set a change writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeTarget {
    /// The owner's global set.
    Global,
    /// What the owner grants the pair.
    PairPerm,
    /// Which grants the pair may flip itself.
    EditAccess,
}

/// Whether the requester changed their own state or someone else's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateDirection {
    Own,
    Other,
}

impl UpdateDirection {
    pub fn of(owner: &UserId, requester: &UserId) -> Self {
        if owner == requester {
            UpdateDirection::Own
        } else {
            UpdateDirection::Other
        }
    }
}

/// A single accepted permission write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionChange {
    /// Whose set is written.
    pub owner: UserId,
    /// The other side of the relationship, for pair targets.
    pub pair: Option<UserId>,
    pub target: ChangeTarget,
    pub name: PermissionName,
    pub value: PermissionValue,
    pub direction: UpdateDirection,
    pub requester: UserId,
}

impl PermissionChange {
    pub fn global(owner: &UserId, name: PermissionName, value: PermissionValue, requester: &UserId) -> Self {
        Self {
            owner: owner.clone(),
            pair: None,
            target: ChangeTarget::Global,
            name,
            value,
            direction: UpdateDirection::of(owner, requester),
            requester: requester.clone(),
        }
    }

    pub fn pair(
        owner: &UserId,
        pair: &UserId,
        target: ChangeTarget,
        name: PermissionName,
        value: PermissionValue,
        requester: &UserId,
    ) -> Self {
        Self {
            owner: owner.clone(),
            pair: Some(pair.clone()),
            target,
            name,
            value,
            direction: UpdateDirection::of(owner, requester),
            requester: requester.clone(),
        }
    }

    /// Whether the change touches the relationship between `a` and `b`.
    pub fn touches_pair(&self, a: &UserId, b: &UserId) -> bool {
        match &self.pair {
            Some(pair) => {
                (&self.owner == a && pair == b) || (&self.owner == b && pair == a)
            }
            None => false,
        }
    }
}

/// Which sets a negotiator is allowed to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteScope {
    /// A client: writes only sets owned by this user. Changes to other
    /// users' sets are validated and returned for pushing.
    Local(UserId),
    /// The authoritative side: writes every validated change.
    Authoritative,
}

impl WriteScope {
    pub fn may_write(&self, owner: &UserId) -> bool {
        match self {
            WriteScope::Local(local) => local == owner,
            WriteScope::Authoritative => true,
        }
    }
}

/// Validates and applies permission changes.
#[derive(Debug, Clone)]
pub struct PermissionNegotiator {
    scope: WriteScope,
}

impl PermissionNegotiator {
    pub fn new(scope: WriteScope) -> Self {
        Self { scope }
    }

    /// A client-side negotiator for `user`.
    pub fn local(user: UserId) -> Self {
        Self::new(WriteScope::Local(user))
    }

    pub fn authoritative() -> Self {
        Self::new(WriteScope::Authoritative)
    }

    pub fn scope(&self) -> &WriteScope {
        &self.scope
    }

    /// Change one of the owner's global permissions.
    ///
    /// Only the owner may do this. Hardcore-channel globals can only be
    /// cleared here, and values pinned by an active hardcore relationship
    /// cannot be changed at all.
    pub fn set_own_permission(
        &self,
        store: &mut PermissionStore,
        owner: &UserId,
        name: PermissionName,
        value: PermissionValue,
        requester: &UserId,
    ) -> Result<PermissionChange> {
        if requester != owner {
            return Err(PermsError::PermissionDenied(format!(
                "{requester} may not change {owner}'s global {name}"
            )));
        }
        let globals = store
            .globals(owner)
            .ok_or_else(|| PermsError::UnknownUser(owner.clone()))?;
        globals.validate(name, &value)?;

        if name.channel() == PermissionChannel::Hardcore && value != name.default_value() {
            return Err(PermsError::HardcoreOnly(name));
        }
        if globals.get(name) != Some(&value) {
            if let Some(by) = hardcore::pinned_by(store, owner, name) {
                return Err(PermsError::HardcoreLocked { name, by });
            }
        }

        let change = PermissionChange::global(owner, name, value, requester);
        self.commit(store, &change)?;
        Ok(change)
    }

    /// Change what `owner` grants `pair`.
    ///
    /// The owner may always do this; the pair only with edit access to
    /// `name`.
    pub fn set_pair_permission(
        &self,
        store: &mut PermissionStore,
        owner: &UserId,
        pair: &UserId,
        name: PermissionName,
        value: PermissionValue,
        requester: &UserId,
    ) -> Result<PermissionChange> {
        let rel = store
            .relationship(owner, pair)
            .ok_or_else(|| PermsError::NotPaired {
                owner: owner.clone(),
                pair: pair.clone(),
            })?;
        rel.perms.validate(name, &value)?;
        if name.is_hardcore_only() {
            return Err(PermsError::HardcoreOnly(name));
        }

        let authorized = requester == owner || (requester == pair && rel.has_edit_access(name));
        if !authorized {
            return Err(PermsError::PermissionDenied(format!(
                "{requester} has no edit access to {name} on {owner}"
            )));
        }

        let change = PermissionChange::pair(owner, pair, ChangeTarget::PairPerm, name, value, requester);
        self.commit(store, &change)?;
        Ok(change)
    }

    /// Grant or withdraw the pair's ability to flip `name` themselves.
    pub fn set_edit_access(
        &self,
        store: &mut PermissionStore,
        owner: &UserId,
        pair: &UserId,
        name: PermissionName,
        allowed: bool,
        requester: &UserId,
    ) -> Result<PermissionChange> {
        if requester != owner {
            return Err(PermsError::PermissionDenied(format!(
                "only {owner} may change edit access"
            )));
        }
        let rel = store
            .relationship(owner, pair)
            .ok_or_else(|| PermsError::NotPaired {
                owner: owner.clone(),
                pair: pair.clone(),
            })?;
        if name.is_hardcore_only() {
            return Err(PermsError::HardcoreOnly(name));
        }
        let value = PermissionValue::Bool(allowed);
        rel.access.validate(name, &value)?;

        let change = PermissionChange::pair(owner, pair, ChangeTarget::EditAccess, name, value, requester);
        self.commit(store, &change)?;
        Ok(change)
    }

    /// Run a change made elsewhere through the same rules.
    ///
    /// A change whose value is already in place is accepted as a no-op;
    /// this is how follow-up changes of a hardcore operation settle after
    /// the operation itself has been replayed.
    pub fn replay(&self, store: &mut PermissionStore, change: &PermissionChange) -> Result<Vec<PermissionChange>> {
        if store.current_value(change) == Some(&change.value) {
            return Ok(Vec::new());
        }

        let owner = &change.owner;
        let requester = &change.requester;
        let value = change.value.clone();

        match (change.target, &change.pair) {
            (ChangeTarget::Global, _) if requester != owner => {
                if change.name == PermissionName::ChatGarblerLocked {
                    let locked = value.as_bool().unwrap_or(false);
                    return self.lock_garbler(store, owner, requester, locked, requester);
                }
                match HardcoreState::from_state_name(change.name) {
                    Some(state) => {
                        let active = value.as_text().is_some_and(|t| !t.is_empty());
                        self.force_state(store, owner, requester, state, active, requester)
                            .map(|c| vec![c])
                    }
                    None => self
                        .set_own_permission(store, owner, change.name, value, requester)
                        .map(|c| vec![c]),
                }
            }
            (ChangeTarget::Global, _) => self
                .set_own_permission(store, owner, change.name, value, requester)
                .map(|c| vec![c]),
            (ChangeTarget::PairPerm, Some(pair)) if change.name.is_hardcore_only() => {
                self.set_hardcore_permission(store, owner, pair, change.name, value, requester)
            }
            (ChangeTarget::PairPerm, Some(pair)) => self
                .set_pair_permission(store, owner, pair, change.name, value, requester)
                .map(|c| vec![c]),
            (ChangeTarget::EditAccess, Some(pair)) => {
                let allowed = value.as_bool().unwrap_or(false);
                self.set_edit_access(store, owner, pair, change.name, allowed, requester)
                    .map(|c| vec![c])
            }
            (_, None) => Err(PermsError::PermissionDenied(
                "pair change without a pair".into(),
            )),
        }
    }

    pub(crate) fn commit(&self, store: &mut PermissionStore, change: &PermissionChange) -> Result<()> {
        if self.scope.may_write(&change.owner) {
            store.apply_change(change)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn alice() -> UserId {
        UserId::new("alice")
    }

    fn bob() -> UserId {
        UserId::new("bob")
    }

    fn paired() -> PermissionStore {
        let mut store = PermissionStore::new();
        store.establish_pair(&alice(), &bob());
        store
    }

    #[test]
    fn test_owner_sets_own_global() {
        let mut store = paired();
        let neg = PermissionNegotiator::authoritative();

        let change = neg
            .set_own_permission(&mut store, &alice(), PermissionName::ChatGarblerActive, true.into(), &alice())
            .unwrap();

        assert_eq!(change.direction, UpdateDirection::Own);
        assert!(store.globals(&alice()).unwrap().get_bool(PermissionName::ChatGarblerActive));
    }

    #[test]
    fn test_other_user_cannot_set_global() {
        let mut store = paired();
        let neg = PermissionNegotiator::authoritative();

        let err = neg
            .set_own_permission(&mut store, &alice(), PermissionName::ChatGarblerActive, true.into(), &bob())
            .unwrap_err();
        assert!(matches!(err, PermsError::PermissionDenied(_)));
    }

    #[test]
    fn test_forced_state_global_cannot_be_set_directly() {
        let mut store = paired();
        let neg = PermissionNegotiator::authoritative();

        let err = neg
            .set_own_permission(&mut store, &alice(), PermissionName::ForcedStay, "bob".into(), &alice())
            .unwrap_err();
        assert!(matches!(err, PermsError::HardcoreOnly(PermissionName::ForcedStay)));
    }

    #[test]
    fn test_pair_without_edit_access_is_denied() {
        let mut store = paired();
        let neg = PermissionNegotiator::authoritative();

        let err = neg
            .set_pair_permission(&mut store, &alice(), &bob(), PermissionName::LockGags, true.into(), &bob())
            .unwrap_err();
        assert!(matches!(err, PermsError::PermissionDenied(_)));
        assert!(!store.grant_bool(&alice(), &bob(), PermissionName::LockGags));
    }

    #[test]
    fn test_pair_with_edit_access_may_flip() {
        let mut store = paired();
        let neg = PermissionNegotiator::authoritative();
        neg.set_edit_access(&mut store, &alice(), &bob(), PermissionName::MaxGagTime, true, &alice())
            .unwrap();

        let change = neg
            .set_pair_permission(
                &mut store,
                &alice(),
                &bob(),
                PermissionName::MaxGagTime,
                Duration::from_secs(600).into(),
                &bob(),
            )
            .unwrap();

        assert_eq!(change.direction, UpdateDirection::Other);
        assert_eq!(
            store.grants(&alice(), &bob()).unwrap().get_duration(PermissionName::MaxGagTime),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn test_edit_access_is_owner_only() {
        let mut store = paired();
        let neg = PermissionNegotiator::authoritative();

        let err = neg
            .set_edit_access(&mut store, &alice(), &bob(), PermissionName::LockGags, true, &bob())
            .unwrap_err();
        assert!(matches!(err, PermsError::PermissionDenied(_)));
    }

    #[test]
    fn test_hardcore_names_rejected_on_standard_channel() {
        let mut store = paired();
        let neg = PermissionNegotiator::authoritative();

        let err = neg
            .set_pair_permission(&mut store, &alice(), &bob(), PermissionName::InHardcore, true.into(), &alice())
            .unwrap_err();
        assert!(matches!(err, PermsError::HardcoreOnly(PermissionName::InHardcore)));

        let err = neg
            .set_edit_access(&mut store, &alice(), &bob(), PermissionName::AllowForcedStay, true, &alice())
            .unwrap_err();
        assert!(matches!(err, PermsError::HardcoreOnly(_)));
    }

    #[test]
    fn test_wrong_variant_is_core_error() {
        let mut store = paired();
        let neg = PermissionNegotiator::authoritative();

        let err = neg
            .set_pair_permission(&mut store, &alice(), &bob(), PermissionName::MaxGagTime, true.into(), &alice())
            .unwrap_err();
        assert!(matches!(err, PermsError::Core(_)));
    }

    #[test]
    fn test_local_scope_does_not_write_other_users() {
        let mut store = paired();
        let owner_side = PermissionNegotiator::authoritative();
        owner_side
            .set_edit_access(&mut store, &alice(), &bob(), PermissionName::LockGags, true, &alice())
            .unwrap();

        let bob_client = PermissionNegotiator::local(bob());
        let change = bob_client
            .set_pair_permission(&mut store, &alice(), &bob(), PermissionName::LockGags, true.into(), &bob())
            .unwrap();

        assert_eq!(change.owner, alice());
        assert!(!store.grant_bool(&alice(), &bob(), PermissionName::LockGags));

        owner_side.replay(&mut store, &change).unwrap();
        assert!(store.grant_bool(&alice(), &bob(), PermissionName::LockGags));
    }

    #[test]
    fn test_replay_revalidates() {
        let mut store = paired();
        let forged = PermissionChange::pair(
            &alice(),
            &bob(),
            ChangeTarget::PairPerm,
            PermissionName::RemoveGags,
            true.into(),
            &bob(),
        );

        let err = PermissionNegotiator::authoritative()
            .replay(&mut store, &forged)
            .unwrap_err();
        assert!(matches!(err, PermsError::PermissionDenied(_)));
    }

    #[test]
    fn test_not_paired() {
        let mut store = PermissionStore::new();
        store.register_user(&alice());
        let err = PermissionNegotiator::authoritative()
            .set_pair_permission(&mut store, &alice(), &bob(), PermissionName::ApplyGags, true.into(), &alice())
            .unwrap_err();
        assert!(matches!(err, PermsError::NotPaired { .. }));
    }

    mod props {
        use proptest::prelude::*;

        use super::*;

        fn pair_names() -> impl Strategy<Value = PermissionName> {
            let names: Vec<PermissionName> = PermissionName::ALL
                .iter()
                .copied()
                .filter(|n| n.has_edit_access())
                .collect();
            proptest::sample::select(names)
        }

        proptest! {
            #[test]
            fn prop_pair_without_edit_access_never_writes(name in pair_names(), flag in any::<bool>()) {
                let mut store = paired();
                let neg = PermissionNegotiator::authoritative();
                let value = match name.default_value() {
                    PermissionValue::Bool(_) => PermissionValue::Bool(flag),
                    PermissionValue::Duration(_) => PermissionValue::Duration(Duration::from_secs(60)),
                    PermissionValue::Text(_) => PermissionValue::from("red"),
                };
                let before = store.clone();

                let result = neg.set_pair_permission(&mut store, &alice(), &bob(), name, value, &bob());

                prop_assert!(result.is_err());
                prop_assert_eq!(store, before);
            }
        }
    }
}
