//! Hardcore channel.
//!
//! Hardcore permissions are never delegable through edit access. A pair in
//! hardcore with an owner may force states onto the owner (follow, stay,
//! blindfold, hidden chat) and lock the owner's chat garbler, as far as the
//! owner's `Allow*` flags for that pair permit. While the relationship is in
//! hardcore the forced values are pinned: the owner cannot change them on
//! the standard channel.

use serde::{Deserialize, Serialize};

use tether_core::{PermissionName, PermissionValue, UserId};

use crate::error::{PermsError, Result};
use crate::negotiator::{ChangeTarget, PermissionChange, PermissionNegotiator};
use crate::store::PermissionStore;

/// A state a hardcore pair can force onto an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HardcoreState {
    ForcedFollow,
    ForcedEmote,
    ForcedStay,
    Blindfolded,
    ChatBoxesHidden,
    ChatInputHidden,
    ChatInputBlocked,
}

impl HardcoreState {
    pub const ALL: [HardcoreState; 7] = [
        HardcoreState::ForcedFollow,
        HardcoreState::ForcedEmote,
        HardcoreState::ForcedStay,
        HardcoreState::Blindfolded,
        HardcoreState::ChatBoxesHidden,
        HardcoreState::ChatInputHidden,
        HardcoreState::ChatInputBlocked,
    ];

    /// Global name holding the enabler of this state (empty when inactive).
    pub const fn state_name(self) -> PermissionName {
        match self {
            HardcoreState::ForcedFollow => PermissionName::ForcedFollow,
            HardcoreState::ForcedEmote => PermissionName::ForcedEmoteState,
            HardcoreState::ForcedStay => PermissionName::ForcedStay,
            HardcoreState::Blindfolded => PermissionName::ForcedBlindfold,
            HardcoreState::ChatBoxesHidden => PermissionName::ChatBoxesHidden,
            HardcoreState::ChatInputHidden => PermissionName::ChatInputHidden,
            HardcoreState::ChatInputBlocked => PermissionName::ChatInputBlocked,
        }
    }

    /// Pair flag the owner must grant before a pair may force this state.
    pub const fn allow_name(self) -> PermissionName {
        match self {
            HardcoreState::ForcedFollow => PermissionName::AllowForcedFollow,
            HardcoreState::ForcedEmote => PermissionName::AllowForcedEmote,
            HardcoreState::ForcedStay => PermissionName::AllowForcedStay,
            HardcoreState::Blindfolded => PermissionName::AllowBlindfold,
            HardcoreState::ChatBoxesHidden => PermissionName::AllowHidingChatBoxes,
            HardcoreState::ChatInputHidden => PermissionName::AllowHidingChatInput,
            HardcoreState::ChatInputBlocked => PermissionName::AllowChatInputBlocking,
        }
    }

    pub fn from_state_name(name: PermissionName) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.state_name() == name)
    }

    pub fn from_allow_name(name: PermissionName) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.allow_name() == name)
    }
}

/// Who currently holds `state` on `owner`, if anyone.
pub fn enabler_of(store: &PermissionStore, owner: &UserId, state: HardcoreState) -> Option<UserId> {
    let holder = store.globals(owner)?.get_text(state.state_name());
    (!holder.is_empty()).then(|| UserId::new(holder))
}

/// Every state currently forced onto `owner`, with its enabler.
pub fn active_forced_states(store: &PermissionStore, owner: &UserId) -> Vec<(HardcoreState, UserId)> {
    HardcoreState::ALL
        .into_iter()
        .filter_map(|state| enabler_of(store, owner, state).map(|by| (state, by)))
        .collect()
}

/// Whether `name` on `owner`'s global set is pinned by hardcore mode.
///
/// Returns the pinning pair when one can be named.
pub fn pinned_by(store: &PermissionStore, owner: &UserId, name: PermissionName) -> Option<Option<UserId>> {
    let globals = store.globals(owner)?;
    let first_hardcore = || {
        let mut pairs: Vec<&UserId> = store.hardcore_pairs(owner).collect();
        pairs.sort();
        pairs.first().map(|p| (*p).clone())
    };

    match name {
        PermissionName::ChatGarblerActive if globals.get_bool(PermissionName::ChatGarblerLocked) => {
            first_hardcore().map(Some)
        }
        PermissionName::ChatGarblerLocked if globals.get_bool(PermissionName::ChatGarblerLocked) => {
            first_hardcore().map(Some)
        }
        _ => {
            let state = HardcoreState::from_state_name(name)?;
            let by = enabler_of(store, owner, state)?;
            store.in_hardcore(owner, &by).then_some(Some(by))
        }
    }
}

impl PermissionNegotiator {
    /// Change a hardcore-only flag on the relationship `owner -> pair`.
    ///
    /// Only the owner may do this. `Allow*` flags can only be raised while
    /// the relationship is in hardcore. Leaving hardcore revokes in the same
    /// call: every hardcore flag of the relationship is reset, states forced
    /// by the pair are released, and the garbler lock is cleared when no
    /// other relationship stays in hardcore. Withdrawing a single `Allow*`
    /// flag releases the matching state if the pair holds it.
    ///
    /// The first returned change is the requested one; the rest follow from it.
    pub fn set_hardcore_permission(
        &self,
        store: &mut PermissionStore,
        owner: &UserId,
        pair: &UserId,
        name: PermissionName,
        value: PermissionValue,
        requester: &UserId,
    ) -> Result<Vec<PermissionChange>> {
        if requester != owner {
            return Err(PermsError::PermissionDenied(format!(
                "only {owner} may change hardcore permissions"
            )));
        }
        let rel = store
            .relationship(owner, pair)
            .ok_or_else(|| PermsError::NotPaired {
                owner: owner.clone(),
                pair: pair.clone(),
            })?;
        rel.perms.validate(name, &value)?;
        if !name.is_hardcore_only() {
            return Err(PermsError::PermissionDenied(format!(
                "{name} is not a hardcore permission"
            )));
        }

        let raising = value.as_bool().unwrap_or(false);
        if name != PermissionName::InHardcore && raising && !rel.in_hardcore() {
            return Err(PermsError::NotInHardcore {
                owner: owner.clone(),
                pair: pair.clone(),
            });
        }
        let was_in_hardcore = rel.in_hardcore();

        let mut changes = vec![PermissionChange::pair(
            owner,
            pair,
            ChangeTarget::PairPerm,
            name,
            value,
            requester,
        )];

        if name == PermissionName::InHardcore && !raising && was_in_hardcore {
            changes.extend(revoke_hardcore(store, owner, pair));
        } else if !raising {
            if let Some(state) = HardcoreState::from_allow_name(name) {
                if enabler_of(store, owner, state).as_ref() == Some(pair) {
                    changes.push(PermissionChange::global(
                        owner,
                        state.state_name(),
                        PermissionValue::from(""),
                        owner,
                    ));
                }
            }
        }

        for change in &changes {
            self.commit(store, change)?;
        }
        Ok(changes)
    }

    /// Force `state` onto `owner`, or release it.
    ///
    /// Requester must be the enabler, who must be in hardcore with the
    /// owner and hold the matching `Allow*` flag. A state held by another
    /// enabler cannot be taken over or released.
    pub fn force_state(
        &self,
        store: &mut PermissionStore,
        owner: &UserId,
        enabler: &UserId,
        state: HardcoreState,
        active: bool,
        requester: &UserId,
    ) -> Result<PermissionChange> {
        check_enabler(store, owner, enabler, state.allow_name(), requester)?;

        if let Some(holder) = enabler_of(store, owner, state) {
            if &holder != enabler {
                return Err(PermsError::AlreadyForced { state, by: holder });
            }
        }

        let value = if active {
            PermissionValue::from(enabler.as_str())
        } else {
            PermissionValue::from("")
        };
        let change = PermissionChange::global(owner, state.state_name(), value, requester);
        self.commit(store, &change)?;
        Ok(change)
    }

    /// Lock or unlock `owner`'s chat garbler.
    ///
    /// Locking also switches the garbler on.
    pub fn lock_garbler(
        &self,
        store: &mut PermissionStore,
        owner: &UserId,
        enabler: &UserId,
        locked: bool,
        requester: &UserId,
    ) -> Result<Vec<PermissionChange>> {
        check_enabler(store, owner, enabler, PermissionName::AllowGarblerLocking, requester)?;

        let mut changes = vec![PermissionChange::global(
            owner,
            PermissionName::ChatGarblerLocked,
            locked.into(),
            requester,
        )];
        if locked {
            changes.push(PermissionChange::global(
                owner,
                PermissionName::ChatGarblerActive,
                true.into(),
                requester,
            ));
        }
        for change in &changes {
            self.commit(store, change)?;
        }
        Ok(changes)
    }
}

fn check_enabler(
    store: &PermissionStore,
    owner: &UserId,
    enabler: &UserId,
    allow: PermissionName,
    requester: &UserId,
) -> Result<()> {
    if requester != enabler {
        return Err(PermsError::PermissionDenied(format!(
            "{requester} is acting on behalf of {enabler}"
        )));
    }
    let rel = store
        .relationship(owner, enabler)
        .ok_or_else(|| PermsError::NotPaired {
            owner: owner.clone(),
            pair: enabler.clone(),
        })?;
    if !rel.in_hardcore() {
        return Err(PermsError::NotInHardcore {
            owner: owner.clone(),
            pair: enabler.clone(),
        });
    }
    if !rel.perms.get_bool(allow) {
        return Err(PermsError::MissingGrant(allow));
    }
    if store.globals(owner).is_none() {
        return Err(PermsError::UnknownUser(owner.clone()));
    }
    Ok(())
}

/// Follow-up changes when `owner` leaves hardcore with `pair`.
fn revoke_hardcore(store: &PermissionStore, owner: &UserId, pair: &UserId) -> Vec<PermissionChange> {
    let mut changes = Vec::new();

    if let Some(rel) = store.relationship(owner, pair) {
        for name in PermissionName::ALL.iter().copied() {
            if !name.is_hardcore_only() || name == PermissionName::InHardcore {
                continue;
            }
            let default = name.default_value();
            if rel.perms.get(name) != Some(&default) {
                changes.push(PermissionChange::pair(
                    owner,
                    pair,
                    ChangeTarget::PairPerm,
                    name,
                    default,
                    owner,
                ));
            }
        }
    }

    for (state, by) in active_forced_states(store, owner) {
        if &by == pair {
            changes.push(PermissionChange::global(
                owner,
                state.state_name(),
                PermissionValue::from(""),
                owner,
            ));
        }
    }

    let others_in_hardcore = store.hardcore_pairs(owner).any(|p| p != pair);
    let garbler_locked = store
        .globals(owner)
        .is_some_and(|g| g.get_bool(PermissionName::ChatGarblerLocked));
    if garbler_locked && !others_in_hardcore {
        changes.push(PermissionChange::global(
            owner,
            PermissionName::ChatGarblerLocked,
            false.into(),
            owner,
        ));
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserId {
        UserId::new("alice")
    }

    fn bob() -> UserId {
        UserId::new("bob")
    }

    fn hardcore_pair(allow: &[PermissionName]) -> (PermissionStore, PermissionNegotiator) {
        let mut store = PermissionStore::new();
        store.establish_pair(&alice(), &bob());
        let neg = PermissionNegotiator::authoritative();
        neg.set_hardcore_permission(&mut store, &alice(), &bob(), PermissionName::InHardcore, true.into(), &alice())
            .unwrap();
        for name in allow {
            neg.set_hardcore_permission(&mut store, &alice(), &bob(), *name, true.into(), &alice())
                .unwrap();
        }
        (store, neg)
    }

    #[test]
    fn test_state_name_mapping_is_total() {
        for state in HardcoreState::ALL {
            assert_eq!(HardcoreState::from_state_name(state.state_name()), Some(state));
            assert_eq!(HardcoreState::from_allow_name(state.allow_name()), Some(state));
            assert!(state.allow_name().is_hardcore_only());
        }
    }

    #[test]
    fn test_allow_flags_need_hardcore() {
        let mut store = PermissionStore::new();
        store.establish_pair(&alice(), &bob());
        let err = PermissionNegotiator::authoritative()
            .set_hardcore_permission(
                &mut store,
                &alice(),
                &bob(),
                PermissionName::AllowForcedStay,
                true.into(),
                &alice(),
            )
            .unwrap_err();
        assert!(matches!(err, PermsError::NotInHardcore { .. }));
    }

    #[test]
    fn test_pair_cannot_change_hardcore_flags() {
        let (mut store, neg) = hardcore_pair(&[]);
        let err = neg
            .set_hardcore_permission(&mut store, &alice(), &bob(), PermissionName::AllowForcedStay, true.into(), &bob())
            .unwrap_err();
        assert!(matches!(err, PermsError::PermissionDenied(_)));
    }

    #[test]
    fn test_force_state_requires_allow_flag() {
        let (mut store, neg) = hardcore_pair(&[]);
        let err = neg
            .force_state(&mut store, &alice(), &bob(), HardcoreState::ForcedStay, true, &bob())
            .unwrap_err();
        assert!(matches!(err, PermsError::MissingGrant(PermissionName::AllowForcedStay)));
    }

    #[test]
    fn test_forced_state_is_pinned() {
        let (mut store, neg) = hardcore_pair(&[PermissionName::AllowForcedStay]);
        neg.force_state(&mut store, &alice(), &bob(), HardcoreState::ForcedStay, true, &bob())
            .unwrap();
        assert_eq!(enabler_of(&store, &alice(), HardcoreState::ForcedStay), Some(bob()));

        let err = neg
            .set_own_permission(&mut store, &alice(), PermissionName::ForcedStay, "".into(), &alice())
            .unwrap_err();
        assert!(matches!(err, PermsError::HardcoreLocked { by: Some(ref by), .. } if by == &bob()));
    }

    #[test]
    fn test_forced_state_cannot_be_taken_over() {
        let carol = UserId::new("carol");
        let (mut store, neg) = hardcore_pair(&[PermissionName::AllowForcedFollow]);
        store.establish_pair(&alice(), &carol);
        neg.set_hardcore_permission(&mut store, &alice(), &carol, PermissionName::InHardcore, true.into(), &alice())
            .unwrap();
        neg.set_hardcore_permission(&mut store, &alice(), &carol, PermissionName::AllowForcedFollow, true.into(), &alice())
            .unwrap();

        neg.force_state(&mut store, &alice(), &bob(), HardcoreState::ForcedFollow, true, &bob())
            .unwrap();
        let err = neg
            .force_state(&mut store, &alice(), &carol, HardcoreState::ForcedFollow, false, &carol)
            .unwrap_err();
        assert!(matches!(err, PermsError::AlreadyForced { .. }));
    }

    #[test]
    fn test_leaving_hardcore_revokes_in_same_call() {
        let (mut store, neg) = hardcore_pair(&[
            PermissionName::AllowForcedStay,
            PermissionName::AllowGarblerLocking,
        ]);
        neg.force_state(&mut store, &alice(), &bob(), HardcoreState::ForcedStay, true, &bob())
            .unwrap();
        neg.lock_garbler(&mut store, &alice(), &bob(), true, &bob()).unwrap();

        let changes = neg
            .set_hardcore_permission(&mut store, &alice(), &bob(), PermissionName::InHardcore, false.into(), &alice())
            .unwrap();

        assert_eq!(changes[0].name, PermissionName::InHardcore);
        let globals = store.globals(&alice()).unwrap();
        assert_eq!(globals.get_text(PermissionName::ForcedStay), "");
        assert!(!globals.get_bool(PermissionName::ChatGarblerLocked));
        assert!(!store.grant_bool(&alice(), &bob(), PermissionName::AllowForcedStay));
        assert!(active_forced_states(&store, &alice()).is_empty());

        // Nothing is pinned any more.
        neg.set_own_permission(&mut store, &alice(), PermissionName::ChatGarblerActive, false.into(), &alice())
            .unwrap();
    }

    #[test]
    fn test_garbler_lock_pins_active_flag() {
        let (mut store, neg) = hardcore_pair(&[PermissionName::AllowGarblerLocking]);
        let changes = neg.lock_garbler(&mut store, &alice(), &bob(), true, &bob()).unwrap();
        assert_eq!(changes.len(), 2);

        let err = neg
            .set_own_permission(&mut store, &alice(), PermissionName::ChatGarblerActive, false.into(), &alice())
            .unwrap_err();
        assert!(matches!(err, PermsError::HardcoreLocked { .. }));
    }

    #[test]
    fn test_withdrawing_allow_releases_state() {
        let (mut store, neg) = hardcore_pair(&[PermissionName::AllowBlindfold]);
        neg.force_state(&mut store, &alice(), &bob(), HardcoreState::Blindfolded, true, &bob())
            .unwrap();

        let changes = neg
            .set_hardcore_permission(&mut store, &alice(), &bob(), PermissionName::AllowBlindfold, false.into(), &alice())
            .unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(enabler_of(&store, &alice(), HardcoreState::Blindfolded), None);
    }

    #[test]
    fn test_replay_of_force_state() {
        let (mut store, neg) = hardcore_pair(&[PermissionName::AllowForcedStay]);
        let bob_client = PermissionNegotiator::local(bob());
        let change = bob_client
            .force_state(&mut store, &alice(), &bob(), HardcoreState::ForcedStay, true, &bob())
            .unwrap();
        assert_eq!(enabler_of(&store, &alice(), HardcoreState::ForcedStay), None);

        neg.replay(&mut store, &change).unwrap();
        assert_eq!(enabler_of(&store, &alice(), HardcoreState::ForcedStay), Some(bob()));
    }
}
