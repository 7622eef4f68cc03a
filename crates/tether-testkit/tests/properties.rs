//! System-wide properties checked over generated inputs.

use std::time::Duration;

use proptest::prelude::*;

use tether::{Client, ClientConfig, LockRequest};
use tether_core::{
    Category, ContentRef, LockAction, LockAuthority, LockError, Lockable, LockableRegistry,
    PadlockKind, PermissionName, PermissionValue, Slot, Timestamp, UserId,
};
use tether_perms::{PermissionNegotiator, PermissionStore};
use tether_store::MemoryStore;
use tether_sync::MemoryHub;
use tether_testkit::fixtures::paired_store;
use tether_testkit::generators::{
    self, grants, lock_action, lockable, pair_entry, pair_name, password, snapshot, timer_kind,
    timestamp, user_id,
};

fn owner() -> UserId {
    UserId::new("owner")
}

fn pair() -> UserId {
    UserId::new("pair")
}

fn sample_content(slot: Slot) -> ContentRef {
    match slot.category() {
        Category::Gag => ContentRef::gag("Ball"),
        Category::RestraintSet => ContentRef::restraint_set("set01"),
    }
}

/// An owner-applied item locked with `kind` for `secs` at `now`.
fn locked_item(slot: Slot, kind: PadlockKind, secs: u64, now: Timestamp) -> Lockable {
    let authority = LockAuthority::default();
    let empty = Lockable::empty(owner(), slot);
    let filled = authority
        .try_transition(&empty, &LockAction::apply(sample_content(slot)), None, &owner(), now)
        .unwrap();
    let action = if kind.takes_password() {
        LockAction::lock_with_password(kind, "secret1", Some(Duration::from_secs(secs)))
    } else {
        LockAction::lock_timed(kind, Duration::from_secs(secs))
    };
    authority
        .try_transition(&filled, &action, None, &owner(), now)
        .unwrap()
}

fn padlock_shape_holds(item: &Lockable) -> bool {
    let padlock = &item.padlock;
    let bare = padlock.password.is_none() && padlock.expires_at.is_none() && padlock.assigner.is_none();
    (padlock.kind == PadlockKind::None) == bare
}

#[derive(Debug, Clone)]
enum PairOp {
    /// The owner toggles edit access.
    Toggle(PermissionName, bool),
    /// The pair tries to write its own grant.
    Attempt(PermissionName, PermissionValue),
}

fn pair_op() -> impl Strategy<Value = PairOp> {
    prop_oneof![
        (pair_name(), any::<bool>()).prop_map(|(name, allowed)| PairOp::Toggle(name, allowed)),
        pair_entry().prop_map(|(name, value)| PairOp::Attempt(name, value)),
    ]
}

proptest! {
    #[test]
    fn padlock_is_bare_exactly_when_unlocked(
        item in lockable(),
        action in lock_action(),
        requester in user_id(),
        grants in grants(),
        now in timestamp(),
    ) {
        prop_assert!(padlock_shape_holds(&item));

        let authority = LockAuthority::default();
        if let Ok(next) = authority.try_transition(&item, &action, Some(&grants), &requester, now) {
            prop_assert!(padlock_shape_holds(&next));
            prop_assert!(next.check_invariant().is_ok());
        }
    }

    #[test]
    fn edit_access_mirrors_every_standard_pair_name(
        toggles in proptest::collection::vec((pair_name(), any::<bool>()), 0..24),
    ) {
        let mut store = paired_store(&[owner(), pair()]);
        let negotiator = PermissionNegotiator::authoritative();
        for (name, allowed) in toggles {
            negotiator
                .set_edit_access(&mut store, &owner(), &pair(), name, allowed, &owner())
                .unwrap();
        }

        let rel = store.relationship(&owner(), &pair()).unwrap();
        for name in PermissionName::in_domain(tether_core::PermissionDomain::Pair) {
            prop_assert_eq!(rel.access.contains(name), !name.is_hardcore_only());
        }
        prop_assert!(store.check_invariants().is_ok());
    }

    #[test]
    fn applying_a_snapshot_twice_changes_nothing(snap in snapshot()) {
        let mut perms = PermissionStore::new();
        let mut items = LockableRegistry::new();

        perms.replace_user(&snap);
        items.replace_user(&snap.user, snap.lockables.values().cloned());
        let (perms_once, items_once) = (perms.clone(), items.clone());

        perms.replace_user(&snap);
        items.replace_user(&snap.user, snap.lockables.values().cloned());
        prop_assert_eq!(perms, perms_once);
        prop_assert_eq!(items, items_once);
    }

    #[test]
    fn pair_without_edit_access_never_writes(ops in proptest::collection::vec(pair_op(), 1..32)) {
        let mut store = paired_store(&[owner(), pair()]);
        let negotiator = PermissionNegotiator::authoritative();

        for op in ops {
            match op {
                PairOp::Toggle(name, allowed) => {
                    negotiator
                        .set_edit_access(&mut store, &owner(), &pair(), name, allowed, &owner())
                        .unwrap();
                }
                PairOp::Attempt(name, value) => {
                    let allowed = store
                        .relationship(&owner(), &pair())
                        .unwrap()
                        .has_edit_access(name);
                    let before = store.clone();
                    match negotiator.set_pair_permission(&mut store, &owner(), &pair(), name, value, &pair()) {
                        Ok(_) => prop_assert!(allowed),
                        Err(_) => prop_assert_eq!(&store, &before),
                    }
                }
            }
        }
    }

    #[test]
    fn timer_padlocks_release_once_due(
        slot in generators::slot(),
        kind in timer_kind(),
        secs in 1u64..=86_400,
        now in timestamp(),
        late in 0i64..=60_000,
    ) {
        let authority = LockAuthority::default();
        let locked = locked_item(slot, kind, secs, now);
        let due = locked.padlock.expires_at.unwrap();

        prop_assert!(authority.expire(&locked, due - 1).is_none());
        let released = authority.expire(&locked, due + late).unwrap();
        prop_assert_eq!(released.padlock.kind, PadlockKind::None);
        prop_assert!(released.check_invariant().is_ok());
    }

    #[test]
    fn mimic_unlock_is_always_refused(
        slot in generators::slot(),
        secs in 1u64..=86_400,
        now in timestamp(),
        requester in user_id(),
        by_owner in any::<bool>(),
        attempt in proptest::option::of(password()),
        grants in grants(),
    ) {
        let authority = LockAuthority::default();
        let locked = locked_item(slot, PadlockKind::Mimic, secs, now);
        let snapshot = locked.clone();
        let who = if by_owner { owner() } else { requester };

        let result = authority.try_transition(
            &locked,
            &LockAction::Unlock { password: attempt },
            Some(&grants),
            &who,
            now,
        );
        prop_assert_eq!(result, Err(LockError::IrreversibleLock));
        prop_assert_eq!(locked, snapshot);
    }

    #[test]
    fn client_applies_own_snapshot_idempotently(snap in snapshot()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let hub = MemoryHub::new();
            let mut client = Client::new(
                hub.connect(snap.user.clone()),
                MemoryStore::new(),
                ClientConfig::default(),
            )
            .unwrap();

            client.apply_snapshot(snap.clone()).await.unwrap();
            let perms = client.permissions().clone();
            let items = client.lockables().clone();

            client.apply_snapshot(snap).await.unwrap();
            assert_eq!(client.permissions(), &perms);
            assert_eq!(client.lockables(), &items);
        });
    }
}

#[tokio::test]
async fn test_expiry_runs_ahead_of_queued_requests() {
    let hub = MemoryHub::new();
    let mut client =
        Client::new(hub.connect(owner()), MemoryStore::new(), ClientConfig::default()).unwrap();
    let me = owner();
    let now: Timestamp = 1_700_000_000_000;
    let slot = Slot::Gag(tether_core::GagLayer::Outer);

    client
        .transition(&me, slot, LockAction::apply(sample_content(slot)), now)
        .await
        .unwrap();
    let locked = client
        .transition(&me, slot, LockAction::lock_timed(PadlockKind::Mimic, Duration::from_secs(30)), now)
        .await
        .unwrap();

    // Requests that would have been refused against the locked item.
    for _ in 0..3 {
        client
            .enqueue(LockRequest::new(&me, slot, LockAction::unlock()))
            .unwrap();
    }
    client
        .enqueue(LockRequest::new(&me, slot, LockAction::Remove))
        .unwrap();

    let report = client.tick(locked.padlock.expires_at.unwrap()).await;

    assert_eq!(report.expired, vec![locked.id]);
    // Unlocking an already released item fails; removing it succeeds.
    assert_eq!(report.rejected.len(), 3);
    assert_eq!(report.applied, vec![locked.id]);
    assert!(client.item(&me, slot).unwrap().is_empty());
}
