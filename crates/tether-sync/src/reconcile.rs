//! Reconciling optimistic changes against authoritative snapshots.
//!
//! Every change a client applies before the authoritative side has seen it
//! is recorded in a [`PendingLedger`]. When a snapshot for the affected
//! user arrives, each entry is either confirmed (the snapshot carries the
//! speculative value) or dropped as a [`SyncConflict`]. Either way the
//! snapshot wins; conflicts are only reported, never surfaced as errors.

use tether_core::{ErrorClass, FullStateSnapshot, LockableId, LockableSnapshot, PermissionValue, UserId};
use tether_perms::{ChangeTarget, PermissionChange};

/// One optimistic change awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingChange {
    Permission(PermissionChange),
    Lock {
        owner: UserId,
        lockable_id: LockableId,
        state: LockableSnapshot,
    },
}

impl PendingChange {
    /// Owner of the state the change speculates about.
    pub fn owner(&self) -> &UserId {
        match self {
            PendingChange::Permission(change) => &change.owner,
            PendingChange::Lock { owner, .. } => owner,
        }
    }

    fn touches_pair(&self, a: &UserId, b: &UserId) -> bool {
        match self {
            PendingChange::Permission(change) => change.touches_pair(a, b),
            PendingChange::Lock { .. } => false,
        }
    }

    /// Whether `snapshot` carries this change's speculative value.
    fn confirmed_by(&self, snapshot: &FullStateSnapshot) -> bool {
        match self {
            PendingChange::Permission(change) => {
                authoritative_value(snapshot, change) == Some(&change.value)
            }
            PendingChange::Lock {
                lockable_id, state, ..
            } => snapshot.lockables.get(lockable_id) == Some(state),
        }
    }
}

fn authoritative_value<'a>(
    snapshot: &'a FullStateSnapshot,
    change: &PermissionChange,
) -> Option<&'a PermissionValue> {
    match change.target {
        ChangeTarget::Global => snapshot.global_perms.get(change.name),
        ChangeTarget::PairPerm => snapshot
            .relationship(change.pair.as_ref()?)?
            .perms
            .get(change.name),
        ChangeTarget::EditAccess => snapshot
            .relationship(change.pair.as_ref()?)?
            .access
            .get(change.name),
    }
}

/// A speculative change the authoritative state disagreed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConflict {
    pub change: PendingChange,
    /// Revision of the snapshot that overrode it.
    pub revision: u64,
}

impl SyncConflict {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::SyncConflict
    }
}

/// Outcome of reconciling one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub confirmed: usize,
    pub conflicts: Vec<SyncConflict>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn merge(&mut self, other: ReconcileReport) {
        self.confirmed += other.confirmed;
        self.conflicts.extend(other.conflicts);
    }
}

/// Optimistic changes in the order they were made.
///
/// An entry is settled only by a snapshot at or past the revision its push
/// was acknowledged with; unacknowledged entries wait.
#[derive(Debug, Clone, Default)]
pub struct PendingLedger {
    entries: Vec<Entry>,
}

#[derive(Debug, Clone)]
struct Entry {
    change: PendingChange,
    acked: Option<u64>,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, change: PendingChange) {
        self.entries.push(Entry { change, acked: None });
    }

    pub fn record_permission(&mut self, change: PermissionChange) {
        self.record(PendingChange::Permission(change));
    }

    pub fn record_lock(&mut self, owner: UserId, state: LockableSnapshot) {
        self.record(PendingChange::Lock {
            owner,
            lockable_id: state.id,
            state,
        });
    }

    /// Stamp `owner`'s unacknowledged entries with the acked revision.
    pub fn acknowledge(&mut self, owner: &UserId, revision: u64) {
        for entry in &mut self.entries {
            if entry.acked.is_none() && entry.change.owner() == owner {
                entry.acked = Some(revision);
            }
        }
    }

    /// Settle every acknowledged entry about `snapshot.user` the snapshot
    /// has caught up with.
    pub fn reconcile(&mut self, snapshot: &FullStateSnapshot) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let (settled, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| {
                entry.change.owner() == &snapshot.user
                    && entry.acked.is_some_and(|r| r <= snapshot.revision)
            });
        self.entries = kept;

        for Entry { change, .. } in settled {
            if change.confirmed_by(snapshot) {
                report.confirmed += 1;
            } else {
                tracing::debug!(
                    user = %snapshot.user,
                    revision = snapshot.revision,
                    change = ?change,
                    "optimistic change overridden by snapshot"
                );
                report.conflicts.push(SyncConflict {
                    change,
                    revision: snapshot.revision,
                });
            }
        }
        report
    }

    /// Drop every entry about `owner`, confirmed or not.
    pub fn discard_user(&mut self, owner: &UserId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.change.owner() != owner);
        before - self.entries.len()
    }

    /// Drop entries touching the pairing between `a` and `b`.
    pub fn abandon_pair(&mut self, a: &UserId, b: &UserId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| !entry.change.touches_pair(a, b));
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingChange> {
        self.entries.iter().map(|entry| &entry.change)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
