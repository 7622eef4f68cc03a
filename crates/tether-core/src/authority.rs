//! The lock authority: the rule engine for item transitions.
//!
//! [`LockAuthority::try_transition`] decides whether a requester may apply,
//! lock, unlock or remove an item, given what the item owner grants that
//! requester. It is pure: it returns the next immutable state and leaves
//! persistence and sync to the caller.
//!
//! ## Transitions
//!
//! ```text
//!             Apply / Remove
//!            +-------------+
//!            v             |
//!       [Unlocked] ----- Lock -----> [Locked(kind)]
//!            ^                            |
//!            +------ Unlock / Expire -----+
//! ```
//!
//! Expiry is evaluated before the requested action, so a request against an
//! item whose timer has already run out applies to the unlocked item.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LockError;
use crate::lockable::{Category, ContentRef, Lockable};
use crate::padlock::{validate_password, Padlock, PadlockKind};
use crate::permission::PermissionName;
use crate::set::PermissionSet;
use crate::types::{Timestamp, UserId};

/// Shortest accepted timer.
pub const MIN_TIMER_DURATION: Duration = Duration::from_secs(1);

/// A requested item transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockAction {
    /// Fill the slot.
    Apply { content: ContentRef },
    /// Padlock the filled slot.
    Lock {
        kind: PadlockKind,
        password: Option<String>,
        duration: Option<Duration>,
    },
    /// Release the padlock.
    Unlock { password: Option<String> },
    /// Empty the slot.
    Remove,
}

impl LockAction {
    pub fn apply(content: ContentRef) -> Self {
        LockAction::Apply { content }
    }

    pub fn lock(kind: PadlockKind) -> Self {
        LockAction::Lock {
            kind,
            password: None,
            duration: None,
        }
    }

    pub fn lock_timed(kind: PadlockKind, duration: Duration) -> Self {
        LockAction::Lock {
            kind,
            password: None,
            duration: Some(duration),
        }
    }

    pub fn lock_with_password(kind: PadlockKind, password: impl Into<String>, duration: Option<Duration>) -> Self {
        LockAction::Lock {
            kind,
            password: Some(password.into()),
            duration,
        }
    }

    pub fn unlock() -> Self {
        LockAction::Unlock { password: None }
    }

    pub fn unlock_with_password(password: impl Into<String>) -> Self {
        LockAction::Unlock {
            password: Some(password.into()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LockAction::Apply { .. } => "apply",
            LockAction::Lock { .. } => "lock",
            LockAction::Unlock { .. } => "unlock",
            LockAction::Remove => "remove",
        }
    }
}

/// What happens to an item's content when its timer runs out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpiryPolicy {
    /// Only the padlock is released.
    #[default]
    KeepContent,
    /// The padlock is released and the slot emptied.
    RemoveContent,
}

/// Requester standing relative to one item.
struct Access<'a> {
    requester: &'a UserId,
    is_owner: bool,
    grants: Option<&'a PermissionSet>,
}

impl Access<'_> {
    fn require(&self, name: PermissionName) -> Result<(), LockError> {
        if self.is_owner || self.grants.is_some_and(|g| g.get_bool(name)) {
            Ok(())
        } else {
            Err(LockError::InsufficientPermission(name))
        }
    }

    /// Longest lock this requester may place; `None` means unbounded.
    fn max_duration(&self, category: Category) -> Option<Duration> {
        if self.is_owner {
            return None;
        }
        Some(
            self.grants
                .map(|g| g.get_duration(PermissionName::max_time(category)))
                .unwrap_or(Duration::ZERO),
        )
    }
}

/// The item transition rule engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockAuthority {
    expiry: ExpiryPolicy,
}

impl LockAuthority {
    pub fn new(expiry: ExpiryPolicy) -> Self {
        Self { expiry }
    }

    pub fn expiry_policy(&self) -> ExpiryPolicy {
        self.expiry
    }

    /// Release an elapsed timer. Returns `None` when nothing changes.
    ///
    /// Not requester-gated: a pure function of the clock.
    pub fn expire(&self, item: &Lockable, now: Timestamp) -> Option<Lockable> {
        if !item.padlock.is_expired(now) {
            return None;
        }
        let mut next = item.clone();
        next.padlock = Padlock::none();
        if self.expiry == ExpiryPolicy::RemoveContent {
            next.content = None;
        }
        Some(next)
    }

    /// The item as it stands at `now`, after any pending expiry.
    pub fn settle(&self, item: &Lockable, now: Timestamp) -> Lockable {
        self.expire(item, now).unwrap_or_else(|| item.clone())
    }

    /// Evaluate `action` by `requester` against `item`.
    ///
    /// `grants` is the item owner's pair permission set for the requester,
    /// or `None` when the two are not paired. The owner needs no grants.
    pub fn try_transition(
        &self,
        item: &Lockable,
        action: &LockAction,
        grants: Option<&PermissionSet>,
        requester: &UserId,
        now: Timestamp,
    ) -> Result<Lockable, LockError> {
        let current = self.settle(item, now);
        let access = Access {
            requester,
            is_owner: requester == &current.owner,
            grants,
        };

        match action {
            LockAction::Apply { content } => apply(current, content, &access),
            LockAction::Lock {
                kind,
                password,
                duration,
            } => lock(current, *kind, password.as_deref(), *duration, &access, now),
            LockAction::Unlock { password } => unlock(current, password.as_deref(), &access),
            LockAction::Remove => remove(current, &access),
        }
    }
}

fn apply(mut item: Lockable, content: &ContentRef, access: &Access<'_>) -> Result<Lockable, LockError> {
    if item.is_locked() {
        return Err(LockError::NotUnlocked);
    }
    if content.category() != item.category() {
        return Err(LockError::CategoryMismatch);
    }
    access.require(PermissionName::apply(item.category()))?;

    item.content = Some(content.clone());
    Ok(item)
}

fn lock(
    mut item: Lockable,
    kind: PadlockKind,
    password: Option<&str>,
    duration: Option<Duration>,
    access: &Access<'_>,
    now: Timestamp,
) -> Result<Lockable, LockError> {
    if kind.is_none() {
        return Err(LockError::NoPadlockKind);
    }
    if item.is_locked() {
        return Err(LockError::NotUnlocked);
    }
    if item.is_empty() {
        return Err(LockError::EmptySlot);
    }
    if kind == PadlockKind::Mimic && !access.is_owner {
        return Err(LockError::OwnerRequired);
    }

    let category = item.category();
    access.require(PermissionName::lock(category))?;
    if kind.is_owner_class() {
        access.require(PermissionName::OwnerLocks)?;
    }
    if kind.is_devotional_class() {
        access.require(PermissionName::DevotionalLocks)?;
    }
    if kind.is_permanent() {
        access.require(PermissionName::PermanentLocks)?;
    }

    let password = match (kind.takes_password(), password) {
        (true, Some(p)) => {
            validate_password(p).map_err(LockError::InvalidPassword)?;
            Some(p.to_string())
        }
        (true, None) => return Err(LockError::InvalidPassword("password required")),
        (false, Some(_)) => {
            return Err(LockError::InvalidPassword("padlock kind takes no password"))
        }
        (false, None) => None,
    };

    let expires_at = if kind.is_timer() {
        let max = access.max_duration(category);
        let requested = duration.unwrap_or(Duration::ZERO);
        let granted = match max {
            Some(max) => requested.min(max),
            None => requested,
        };
        if granted < MIN_TIMER_DURATION {
            return Err(LockError::DurationOutOfRange {
                min: MIN_TIMER_DURATION,
                max: max.unwrap_or(Duration::MAX),
            });
        }
        let millis = i64::try_from(granted.as_millis()).unwrap_or(i64::MAX);
        Some(now.saturating_add(millis))
    } else {
        if duration.is_some() {
            return Err(LockError::DurationOutOfRange {
                min: Duration::ZERO,
                max: Duration::ZERO,
            });
        }
        None
    };

    item.padlock = Padlock {
        kind,
        password,
        expires_at,
        assigner: Some(access.requester.clone()),
    };
    Ok(item)
}

fn unlock(mut item: Lockable, attempt: Option<&str>, access: &Access<'_>) -> Result<Lockable, LockError> {
    if !item.is_locked() {
        return Err(LockError::NotLocked);
    }
    let kind = item.padlock.kind;
    if kind == PadlockKind::Mimic {
        return Err(LockError::IrreversibleLock);
    }

    let category = item.category();
    let is_assigner = item.padlock.assigner.as_ref() == Some(access.requester);
    if kind.is_owner_class() || kind.is_devotional_class() {
        if !access.is_owner && !is_assigner {
            if kind.is_owner_class() {
                access.require(PermissionName::OwnerLocks)?;
            } else {
                access.require(PermissionName::DevotionalLocks)?;
            }
            access.require(PermissionName::unlock(category))?;
        }
    } else {
        access.require(PermissionName::unlock(category))?;
    }

    if kind.takes_password() {
        let matches = attempt.is_some_and(|a| item.padlock.password_matches(a));
        if !matches {
            return Err(LockError::PasswordMismatch);
        }
    }

    item.padlock = Padlock::none();
    Ok(item)
}

fn remove(mut item: Lockable, access: &Access<'_>) -> Result<Lockable, LockError> {
    if item.is_locked() {
        return Err(LockError::NotUnlocked);
    }
    if item.is_empty() {
        return Err(LockError::EmptySlot);
    }
    access.require(PermissionName::remove(item.category()))?;

    item.content = None;
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockable::{GagLayer, Slot};
    use crate::set::SetKind;

    const HOUR: Duration = Duration::from_secs(3600);
    const NOW: Timestamp = 1_700_000_000_000;

    fn owner() -> UserId {
        UserId::new("owner")
    }

    fn pair() -> UserId {
        UserId::new("pair")
    }

    fn gag_slot() -> Lockable {
        Lockable::empty(owner(), Slot::Gag(GagLayer::Inner))
    }

    fn filled_gag() -> Lockable {
        let mut item = gag_slot();
        item.content = Some(ContentRef::gag("Ring Gag"));
        item
    }

    fn grants(names: &[PermissionName]) -> PermissionSet {
        let mut set = PermissionSet::with_defaults(SetKind::UniquePairPerm);
        for name in names {
            set.set(*name, true.into()).unwrap();
        }
        set
    }

    fn locked(kind: PadlockKind, assigner: &str) -> Lockable {
        let mut item = filled_gag();
        item.padlock = Padlock {
            kind,
            password: kind.takes_password().then(|| "pass1".to_string()),
            expires_at: kind.is_timer().then_some(NOW + 60_000),
            assigner: Some(UserId::new(assigner)),
        };
        item
    }

    #[test]
    fn test_apply_then_lock_without_lock_permission() {
        let authority = LockAuthority::default();
        let perms = grants(&[PermissionName::ApplyGags]);

        let applied = authority
            .try_transition(
                &gag_slot(),
                &LockAction::apply(ContentRef::gag("Ring")),
                Some(&perms),
                &pair(),
                NOW,
            )
            .unwrap();
        assert_eq!(applied.content, Some(ContentRef::gag("Ring")));
        assert!(!applied.is_locked());

        let err = authority
            .try_transition(&applied, &LockAction::lock(PadlockKind::Basic), Some(&perms), &pair(), NOW)
            .unwrap_err();
        assert_eq!(err, LockError::InsufficientPermission(PermissionName::LockGags));
    }

    #[test]
    fn test_timer_is_clamped_to_max_gag_time() {
        let authority = LockAuthority::default();
        let mut perms = grants(&[PermissionName::LockGags]);
        perms.set(PermissionName::MaxGagTime, (2 * HOUR).into()).unwrap();

        let next = authority
            .try_transition(
                &filled_gag(),
                &LockAction::lock_timed(PadlockKind::Timer, 5 * HOUR),
                Some(&perms),
                &pair(),
                NOW,
            )
            .unwrap();

        assert_eq!(next.padlock.kind, PadlockKind::Timer);
        assert_eq!(next.padlock.expires_at, Some(NOW + 2 * 3_600_000));
        assert_eq!(next.padlock.assigner, Some(pair()));
    }

    #[test]
    fn test_timer_rejected_when_max_is_zero() {
        let authority = LockAuthority::default();
        let perms = grants(&[PermissionName::LockGags]);

        let err = authority
            .try_transition(
                &filled_gag(),
                &LockAction::lock_timed(PadlockKind::Timer, HOUR),
                Some(&perms),
                &pair(),
                NOW,
            )
            .unwrap_err();
        assert!(matches!(err, LockError::DurationOutOfRange { .. }));
    }

    #[test]
    fn test_non_timer_kind_rejects_duration() {
        let authority = LockAuthority::default();
        let perms = grants(&[PermissionName::LockGags, PermissionName::PermanentLocks]);

        let err = authority
            .try_transition(
                &filled_gag(),
                &LockAction::lock_timed(PadlockKind::Basic, Duration::ZERO),
                Some(&perms),
                &pair(),
                NOW,
            )
            .unwrap_err();
        assert_eq!(
            err,
            LockError::DurationOutOfRange {
                min: Duration::ZERO,
                max: Duration::ZERO
            }
        );
    }

    #[test]
    fn test_lock_check_order() {
        let authority = LockAuthority::default();
        let action = LockAction::lock(PadlockKind::Owner);

        let perms = grants(&[PermissionName::LockGags]);
        let err = authority
            .try_transition(&filled_gag(), &action, Some(&perms), &pair(), NOW)
            .unwrap_err();
        assert_eq!(err, LockError::InsufficientPermission(PermissionName::OwnerLocks));

        let perms = grants(&[PermissionName::LockGags, PermissionName::OwnerLocks]);
        let err = authority
            .try_transition(&filled_gag(), &action, Some(&perms), &pair(), NOW)
            .unwrap_err();
        assert_eq!(err, LockError::InsufficientPermission(PermissionName::PermanentLocks));

        let perms = grants(&[
            PermissionName::LockGags,
            PermissionName::OwnerLocks,
            PermissionName::PermanentLocks,
        ]);
        let next = authority
            .try_transition(&filled_gag(), &action, Some(&perms), &pair(), NOW)
            .unwrap();
        next.check_invariant().unwrap();
    }

    #[test]
    fn test_owner_lock_unlock_rules() {
        let authority = LockAuthority::default();
        let item = locked(PadlockKind::Owner, "assigner");
        let stranger = UserId::new("stranger");
        let perms = grants(&[PermissionName::UnlockGags]);

        let err = authority
            .try_transition(&item, &LockAction::unlock(), Some(&perms), &stranger, NOW)
            .unwrap_err();
        assert_eq!(err, LockError::InsufficientPermission(PermissionName::OwnerLocks));

        let by_owner = authority
            .try_transition(&item, &LockAction::unlock(), None, &owner(), NOW)
            .unwrap();
        assert!(!by_owner.is_locked());

        let by_assigner = authority
            .try_transition(&item, &LockAction::unlock(), None, &UserId::new("assigner"), NOW)
            .unwrap();
        assert!(!by_assigner.is_locked());
    }

    #[test]
    fn test_devotional_unlock_needs_devotional_locks() {
        let authority = LockAuthority::default();
        let item = locked(PadlockKind::DevotionalTimer, "assigner");
        let perms = grants(&[PermissionName::UnlockGags, PermissionName::OwnerLocks]);

        let err = authority
            .try_transition(&item, &LockAction::unlock(), Some(&perms), &pair(), NOW)
            .unwrap_err();
        assert_eq!(
            err,
            LockError::InsufficientPermission(PermissionName::DevotionalLocks)
        );
    }

    #[test]
    fn test_password_unlock() {
        let authority = LockAuthority::default();
        let item = locked(PadlockKind::Password, "assigner");
        let perms = grants(&[PermissionName::UnlockGags]);

        let err = authority
            .try_transition(&item, &LockAction::unlock_with_password("wrong"), Some(&perms), &pair(), NOW)
            .unwrap_err();
        assert_eq!(err, LockError::PasswordMismatch);

        let err = authority
            .try_transition(&item, &LockAction::unlock(), None, &owner(), NOW)
            .unwrap_err();
        assert_eq!(err, LockError::PasswordMismatch);

        let next = authority
            .try_transition(&item, &LockAction::unlock_with_password("pass1"), Some(&perms), &pair(), NOW)
            .unwrap();
        assert_eq!(next.padlock, Padlock::none());
    }

    #[test]
    fn test_mimic_is_irreversible() {
        let authority = LockAuthority::default();
        let item = locked(PadlockKind::Mimic, "owner");

        for requester in [owner(), pair()] {
            let err = authority
                .try_transition(&item, &LockAction::unlock(), None, &requester, NOW)
                .unwrap_err();
            assert_eq!(err, LockError::IrreversibleLock);
        }
    }

    #[test]
    fn test_mimic_only_self_applied() {
        let authority = LockAuthority::default();
        let perms = grants(&[PermissionName::LockGags]);
        let action = LockAction::lock_timed(PadlockKind::Mimic, HOUR);

        let err = authority
            .try_transition(&filled_gag(), &action, Some(&perms), &pair(), NOW)
            .unwrap_err();
        assert_eq!(err, LockError::OwnerRequired);

        let next = authority
            .try_transition(&filled_gag(), &action, None, &owner(), NOW)
            .unwrap();
        assert_eq!(next.padlock.expires_at, Some(NOW + 3_600_000));
    }

    #[test]
    fn test_expiry_wins_over_lock() {
        let authority = LockAuthority::default();
        let item = locked(PadlockKind::Timer, "pair");
        let later = NOW + 60_000;
        let perms = grants(&[PermissionName::LockGags, PermissionName::PermanentLocks]);

        let next = authority
            .try_transition(&item, &LockAction::lock(PadlockKind::Basic), Some(&perms), &pair(), later)
            .unwrap();
        assert_eq!(next.padlock.kind, PadlockKind::Basic);
    }

    #[test]
    fn test_expire_policy() {
        let item = locked(PadlockKind::Timer, "pair");

        assert!(LockAuthority::default().expire(&item, NOW).is_none());

        let kept = LockAuthority::new(ExpiryPolicy::KeepContent)
            .expire(&item, NOW + 60_000)
            .unwrap();
        assert!(!kept.is_locked());
        assert!(kept.content.is_some());

        let removed = LockAuthority::new(ExpiryPolicy::RemoveContent)
            .expire(&item, NOW + 60_000)
            .unwrap();
        assert!(removed.content.is_none());
        removed.check_invariant().unwrap();
    }

    #[test]
    fn test_permanent_locks_never_expire() {
        let item = locked(PadlockKind::Basic, "pair");
        assert!(LockAuthority::default().expire(&item, i64::MAX).is_none());
    }

    #[test]
    fn test_apply_and_remove_rules() {
        let authority = LockAuthority::default();

        let err = authority
            .try_transition(
                &gag_slot(),
                &LockAction::apply(ContentRef::restraint_set("set-1")),
                None,
                &owner(),
                NOW,
            )
            .unwrap_err();
        assert_eq!(err, LockError::CategoryMismatch);

        let err = authority
            .try_transition(&locked(PadlockKind::Basic, "pair"), &LockAction::Remove, None, &owner(), NOW)
            .unwrap_err();
        assert_eq!(err, LockError::NotUnlocked);

        let err = authority
            .try_transition(&filled_gag(), &LockAction::Remove, None, &pair(), NOW)
            .unwrap_err();
        assert_eq!(err, LockError::InsufficientPermission(PermissionName::RemoveGags));

        let next = authority
            .try_transition(&filled_gag(), &LockAction::Remove, None, &owner(), NOW)
            .unwrap();
        assert!(next.is_empty());
    }

    #[test]
    fn test_lock_empty_slot() {
        let authority = LockAuthority::default();
        let err = authority
            .try_transition(&gag_slot(), &LockAction::lock(PadlockKind::Basic), None, &owner(), NOW)
            .unwrap_err();
        assert_eq!(err, LockError::EmptySlot);
    }

    #[test]
    fn test_unpaired_requester_is_denied() {
        let authority = LockAuthority::default();
        let err = authority
            .try_transition(
                &gag_slot(),
                &LockAction::apply(ContentRef::gag("Ball Gag")),
                None,
                &pair(),
                NOW,
            )
            .unwrap_err();
        assert_eq!(err, LockError::InsufficientPermission(PermissionName::ApplyGags));
    }
}
