//! Proptest generators for property-based testing.

use std::time::Duration;

use proptest::prelude::*;

use tether_core::{
    Category, ContentRef, FullStateSnapshot, GagLayer, LockAction, LockAuthority, Lockable,
    PadlockKind, PermissionName, PermissionSet, PermissionValue, PermissionValueType,
    Relationship, SetKind, Slot, Timestamp, UserId,
};

/// Generate a user id.
pub fn user_id() -> impl Strategy<Value = UserId> {
    "[a-z]{3,10}".prop_map(UserId::new)
}

/// Generate a timestamp between 1970 and roughly 2096.
pub fn timestamp() -> impl Strategy<Value = Timestamp> {
    0i64..=4_000_000_000_000i64
}

/// Generate a lock duration of up to ten hours, zero included.
pub fn duration() -> impl Strategy<Value = Duration> {
    (0u64..=10 * 3600).prop_map(Duration::from_secs)
}

pub fn slot() -> impl Strategy<Value = Slot> {
    prop_oneof![
        Just(Slot::Gag(GagLayer::Inner)),
        Just(Slot::Gag(GagLayer::Middle)),
        Just(Slot::Gag(GagLayer::Outer)),
        Just(Slot::RestraintSet),
    ]
}

/// Content that fits `slot`.
pub fn content_for(slot: Slot) -> BoxedStrategy<ContentRef> {
    match slot.category() {
        Category::Gag => "[A-Z][a-z]{2,8}".prop_map(ContentRef::gag).boxed(),
        Category::RestraintSet => "[a-z0-9]{6}".prop_map(ContentRef::restraint_set).boxed(),
    }
}

/// Content of either category.
pub fn content() -> impl Strategy<Value = ContentRef> {
    prop_oneof![
        content_for(Slot::Gag(GagLayer::Inner)),
        content_for(Slot::RestraintSet),
    ]
}

pub fn padlock_kind() -> impl Strategy<Value = PadlockKind> {
    proptest::sample::select(PadlockKind::ALL)
}

/// Kinds that carry an expiry.
pub fn timer_kind() -> impl Strategy<Value = PadlockKind> {
    padlock_kind().prop_filter("timer kinds only", |kind| kind.is_timer())
}

/// A password, mostly valid. Invalid ones exercise rejection paths.
pub fn password() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[a-zA-Z0-9]{1,20}",
        1 => "[a-z !]{0,24}",
    ]
}

/// Any item action, well-formed or not.
pub fn lock_action() -> impl Strategy<Value = LockAction> {
    prop_oneof![
        content().prop_map(LockAction::apply),
        (
            padlock_kind(),
            proptest::option::of(password()),
            proptest::option::of(duration()),
        )
            .prop_map(|(kind, password, duration)| LockAction::Lock {
                kind,
                password,
                duration,
            }),
        proptest::option::of(password()).prop_map(|password| LockAction::Unlock { password }),
        Just(LockAction::Remove),
    ]
}

/// Pair names on the standard channel, the ones with edit access.
pub fn pair_name() -> impl Strategy<Value = PermissionName> {
    let names: Vec<PermissionName> = PermissionName::ALL
        .iter()
        .copied()
        .filter(|name| name.has_edit_access())
        .collect();
    proptest::sample::select(names)
}

/// A value of the right type for `name`.
pub fn permission_value_for(name: PermissionName) -> BoxedStrategy<PermissionValue> {
    match name.value_type() {
        PermissionValueType::Bool => any::<bool>().prop_map(PermissionValue::from).boxed(),
        PermissionValueType::Duration => duration().prop_map(PermissionValue::from).boxed(),
        PermissionValueType::Text => "[a-z ]{0,16}".prop_map(PermissionValue::from).boxed(),
    }
}

/// A name together with a value it accepts.
pub fn pair_entry() -> impl Strategy<Value = (PermissionName, PermissionValue)> {
    pair_name().prop_flat_map(|name| (Just(name), permission_value_for(name)))
}

/// A pair permission set with random standard grants.
pub fn grants() -> impl Strategy<Value = PermissionSet> {
    proptest::collection::vec(pair_entry(), 0..16).prop_map(|entries| {
        let mut set = PermissionSet::with_defaults(SetKind::UniquePairPerm);
        for (name, value) in entries {
            set.set(name, value).ok();
        }
        set
    })
}

/// Run `actions` as the owner, keeping the transitions that succeed.
fn act_as_owner(mut item: Lockable, actions: &[LockAction], now: Timestamp) -> Lockable {
    let authority = LockAuthority::default();
    let owner = item.owner.clone();
    for action in actions {
        if let Ok(next) = authority.try_transition(&item, action, None, &owner, now) {
            item = next;
        }
    }
    item
}

/// A well-formed item reached by owner actions from an empty slot.
pub fn lockable() -> impl Strategy<Value = Lockable> {
    (user_id(), slot())
        .prop_flat_map(|(owner, slot)| {
            (
                Just(owner),
                Just(slot),
                proptest::option::of(content_for(slot)),
                timestamp(),
                proptest::collection::vec(lock_action(), 0..6),
            )
        })
        .prop_map(|(owner, slot, content, now, mut actions)| {
            if let Some(content) = content {
                actions.insert(0, LockAction::apply(content));
            }
            act_as_owner(Lockable::empty(owner, slot), &actions, now)
        })
}

/// A valid snapshot with a few pairs and some item activity.
pub fn snapshot() -> impl Strategy<Value = FullStateSnapshot> {
    (
        user_id(),
        0u64..1000,
        proptest::collection::vec((user_id(), grants()), 0..3),
        proptest::collection::vec(lock_action(), 0..6),
        timestamp(),
    )
        .prop_map(|(user, revision, pairs, actions, now)| {
            let mut snapshot = FullStateSnapshot::initial(user.clone());
            snapshot.revision = revision;
            for (pair, perms) in pairs {
                if pair == user {
                    continue;
                }
                let mut rel = Relationship::with_defaults();
                rel.perms = perms;
                snapshot.pair_perms.insert(pair, rel);
            }
            for item in snapshot.lockables.values_mut() {
                *item = act_as_owner(item.clone(), &actions, now);
            }
            snapshot
        })
}
