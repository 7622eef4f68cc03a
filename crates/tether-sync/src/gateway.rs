//! The synchronization boundary.
//!
//! Clients never talk to each other directly. Every optimistic change is
//! pushed through a [`SyncGateway`] to an authoritative side, which answers
//! with an [`Ack`] or a rejection and later broadcasts full snapshots of
//! every user the change touched.

use async_trait::async_trait;

use tether_core::{FullStateSnapshot, UserId};
use tether_perms::PermissionChange;

use crate::error::Result;
use crate::messages::{Ack, LockUpdate};

/// Callback invoked with every snapshot addressed to the local user.
pub type SnapshotCallback = Box<dyn Fn(FullStateSnapshot) + Send + Sync>;

/// Connection of one user to the authoritative side.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait SyncGateway: Send + Sync {
    /// The user this gateway speaks for.
    fn local_user(&self) -> &UserId;

    /// Push an optimistic permission change.
    async fn push_permission_update(&self, change: PermissionChange) -> Result<Ack>;

    /// Push an optimistic item transition.
    async fn push_lock_update(&self, update: LockUpdate) -> Result<Ack>;

    /// Ask to be paired with `pair`.
    async fn request_pairing(&self, pair: &UserId) -> Result<Ack>;

    /// Dissolve the pairing with `pair`.
    async fn remove_pairing(&self, pair: &UserId) -> Result<Ack>;

    /// Ask for fresh snapshots of the local user and every pair.
    async fn request_resync(&self) -> Result<Ack>;

    /// Register the snapshot callback. Replaces any earlier one.
    fn on_snapshot(&self, callback: SnapshotCallback);
}

/// An in-process authoritative side for tests and single-process setups.
///
/// Every push is CBOR-encoded, decoded by the hub, re-validated against
/// the hub's own state and answered with an encoded reply, so the full
/// message path is exercised.
pub mod memory {
    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::sync::{Arc, Mutex, MutexGuard};

    use async_trait::async_trait;
    use bytes::Bytes;

    use tether_core::{
        ErrorClass, ExpiryPolicy, FullStateSnapshot, LockAuthority, LockableRegistry, Timestamp,
        UserId,
    };
    use tether_perms::{PermissionChange, PermissionNegotiator, PermissionStore};

    use super::{SnapshotCallback, SyncGateway};
    use crate::error::{Result, SyncError};
    use crate::messages::{Ack, LockStep, LockUpdate, SyncMessage, PROTOCOL_VERSION};

    type Subscriber = Arc<dyn Fn(FullStateSnapshot) + Send + Sync>;

    /// Shared authoritative state.
    pub struct MemoryHub {
        state: Mutex<HubState>,
    }

    #[derive(Default)]
    struct HubState {
        perms: PermissionStore,
        lockables: LockableRegistry,
        revisions: HashMap<UserId, u64>,
        subscribers: HashMap<UserId, Subscriber>,
        unreachable: HashSet<UserId>,
    }

    /// What a handled message changed.
    #[derive(Default)]
    struct Outcome {
        revision: u64,
        /// Owners whose state changed; each gets a new revision.
        changed: Vec<UserId>,
        /// Resend every relevant snapshot to this user.
        resend_to: Option<UserId>,
    }

    impl HubState {
        fn knows(&self, user: &UserId) -> bool {
            self.revisions.contains_key(user)
        }

        fn bump(&mut self, user: &UserId) -> u64 {
            let revision = self.revisions.entry(user.clone()).or_insert(0);
            *revision += 1;
            *revision
        }

        fn snapshot_of(&self, user: &UserId) -> Option<FullStateSnapshot> {
            let revision = *self.revisions.get(user)?;
            let (global_perms, pair_perms) = self.perms.export_user(user)?;
            let lockables: BTreeMap<_, _> = self
                .lockables
                .owned_by(user)
                .map(|item| (item.id, item.clone()))
                .collect();
            Some(FullStateSnapshot {
                user: user.clone(),
                revision,
                global_perms,
                pair_perms,
                lockables,
            })
        }

        fn handle(&mut self, from: &UserId, message: SyncMessage) -> std::result::Result<Outcome, SyncError> {
            if !self.knows(from) {
                return Err(SyncError::UnknownUser(from.clone()));
            }
            match message {
                SyncMessage::Hello { protocol_version, .. } => {
                    if protocol_version != PROTOCOL_VERSION {
                        return Err(rejected(
                            ErrorClass::InvalidState,
                            format!("protocol version {protocol_version} not supported"),
                        ));
                    }
                    Ok(Outcome {
                        revision: self.revisions.get(from).copied().unwrap_or(0),
                        resend_to: Some(from.clone()),
                        ..Outcome::default()
                    })
                }
                SyncMessage::Pair { pair } => {
                    if &pair == from || !self.knows(&pair) {
                        return Err(rejected(ErrorClass::InvalidState, format!("cannot pair with {pair}")));
                    }
                    self.perms.establish_pair(from, &pair);
                    self.changed(from, vec![from.clone(), pair])
                }
                SyncMessage::Unpair { pair } => {
                    self.perms.remove_pair(from, &pair);
                    self.changed(from, vec![from.clone(), pair])
                }
                SyncMessage::Permission(change) => self.apply_permission(from, change),
                SyncMessage::Lock(update) => self.apply_lock(from, update),
                other => Err(rejected(
                    ErrorClass::InvalidState,
                    format!("unexpected {} from client", other.kind()),
                )),
            }
        }

        fn changed(&mut self, from: &UserId, changed: Vec<UserId>) -> std::result::Result<Outcome, SyncError> {
            let mut revision = 0;
            for user in &changed {
                let bumped = self.bump(user);
                if user == from {
                    revision = bumped;
                }
            }
            Ok(Outcome {
                revision,
                changed,
                resend_to: None,
            })
        }

        fn apply_permission(&mut self, from: &UserId, change: PermissionChange) -> std::result::Result<Outcome, SyncError> {
            if &change.requester != from {
                return Err(rejected(ErrorClass::PermissionDenied, "requester mismatch".into()));
            }
            let applied = PermissionNegotiator::authoritative()
                .replay(&mut self.perms, &change)
                .map_err(|e| rejected(e.class(), e.to_string()))?;

            // Already in place: ack at the current revision and resend it so
            // the requester can settle the change.
            if applied.is_empty() {
                return Ok(Outcome {
                    revision: self.revisions.get(&change.owner).copied().unwrap_or(0),
                    resend_to: Some(from.clone()),
                    ..Outcome::default()
                });
            }
            let revision = self.bump(&change.owner);
            Ok(Outcome {
                revision,
                changed: vec![change.owner],
                resend_to: None,
            })
        }

        fn apply_lock(&mut self, from: &UserId, update: LockUpdate) -> std::result::Result<Outcome, SyncError> {
            if &update.requester != from {
                return Err(rejected(ErrorClass::PermissionDenied, "requester mismatch".into()));
            }
            let current = self
                .lockables
                .get(&update.lockable_id)
                .ok_or_else(|| rejected(ErrorClass::InvalidState, format!("unknown lockable {}", update.lockable_id)))?;
            if current.owner != update.owner
                || update.new_state.owner != update.owner
                || update.new_state.id != update.lockable_id
            {
                return Err(rejected(ErrorClass::InvalidState, "lockable does not match owner".into()));
            }
            if &update.owner != from && !self.perms.is_paired(&update.owner, from) {
                return Err(rejected(
                    ErrorClass::PermissionDenied,
                    format!("{from} is not paired with {}", update.owner),
                ));
            }
            if current.padlock.kind != update.prev_kind {
                return Err(rejected(
                    ErrorClass::InvalidState,
                    format!(
                        "padlock is {}, update expected {}",
                        current.padlock.kind, update.prev_kind
                    ),
                ));
            }
            if update.at > wall_clock_millis().saturating_add(MAX_CLOCK_SKEW_MS) {
                return Err(rejected(
                    ErrorClass::InvalidState,
                    format!("update timestamp {} is ahead of the hub clock", update.at),
                ));
            }

            // Only the owner decides whether expiry empties their items.
            let expiry = if from == &update.owner {
                update.expiry
            } else {
                ExpiryPolicy::KeepContent
            };
            let authority = LockAuthority::new(expiry);
            let expected = match &update.step {
                LockStep::Action(action) => {
                    let grants = if from == &update.owner {
                        None
                    } else {
                        self.perms.grants(&update.owner, from)
                    };
                    authority
                        .try_transition(current, action, grants, from, update.at)
                        .map_err(|e| rejected(e.class(), e.to_string()))?
                }
                LockStep::Expire => authority.expire(current, update.at).ok_or_else(|| {
                    rejected(ErrorClass::InvalidState, "padlock has not expired".into())
                })?,
            };
            if expected != update.new_state {
                return Err(rejected(
                    ErrorClass::InvalidState,
                    format!("pushed state of {} does not follow from the step", update.lockable_id),
                ));
            }

            self.lockables
                .put(update.new_state)
                .map_err(|e| rejected(ErrorClass::InvalidState, e.to_string()))?;

            let revision = self.bump(&update.owner);
            Ok(Outcome {
                revision,
                changed: vec![update.owner],
                resend_to: None,
            })
        }

        /// Snapshots owed to subscribers after `outcome`.
        fn deliveries(&self, outcome: &Outcome) -> Vec<(Subscriber, FullStateSnapshot)> {
            let mut out = Vec::new();
            let mut send = |to: &UserId, snapshot: &FullStateSnapshot| {
                if let Some(cb) = self.subscribers.get(to) {
                    out.push((Arc::clone(cb), snapshot.clone()));
                }
            };

            for owner in &outcome.changed {
                let Some(snapshot) = self.snapshot_of(owner) else {
                    continue;
                };
                let mut recipients: Vec<UserId> = self.perms.pairs_of(owner);
                recipients.extend(outcome.changed.iter().cloned());
                recipients.push(owner.clone());
                recipients.sort();
                recipients.dedup();
                for to in &recipients {
                    send(to, &snapshot);
                }
            }

            if let Some(user) = &outcome.resend_to {
                let mut owners = self.perms.pairs_of(user);
                owners.push(user.clone());
                for owner in &owners {
                    if let Some(snapshot) = self.snapshot_of(owner) {
                        send(user, &snapshot);
                    }
                }
            }
            out
        }
    }

    fn rejected(class: ErrorClass, reason: String) -> SyncError {
        SyncError::Rejected { class, reason }
    }

    /// How far a pushed timestamp may run ahead of the hub's clock.
    const MAX_CLOCK_SKEW_MS: i64 = 60_000;

    fn wall_clock_millis() -> Timestamp {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as Timestamp)
            .unwrap_or(0)
    }

    impl MemoryHub {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(HubState::default()),
            })
        }

        fn lock(&self) -> MutexGuard<'_, HubState> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Register `user` and hand out their gateway.
        pub fn connect(self: &Arc<Self>, user: UserId) -> MemoryGateway {
            {
                let mut state = self.lock();
                state.perms.register_user(&user);
                state.lockables.register_user(&user);
                state.revisions.entry(user.clone()).or_insert(0);
            }
            MemoryGateway {
                user,
                hub: Arc::clone(self),
            }
        }

        /// Current authoritative snapshot of `user`.
        pub fn snapshot_of(&self, user: &UserId) -> Option<FullStateSnapshot> {
            self.lock().snapshot_of(user)
        }

        /// Simulate `user` losing (or regaining) their connection.
        pub fn set_reachable(&self, user: &UserId, reachable: bool) {
            let mut state = self.lock();
            if reachable {
                state.unreachable.remove(user);
            } else {
                state.unreachable.insert(user.clone());
            }
        }

        fn subscribe(&self, user: &UserId, callback: SnapshotCallback) {
            self.lock()
                .subscribers
                .insert(user.clone(), Arc::from(callback));
        }

        /// Handle one encoded request from `from` and return the encoded reply.
        fn exchange(&self, from: &UserId, request: Bytes) -> Result<Bytes> {
            let (reply, deliveries) = {
                let mut state = self.lock();
                if state.unreachable.contains(from) {
                    return Err(SyncError::TransportError(format!("{from} is unreachable")));
                }

                let message = SyncMessage::from_bytes(&request)?;
                let kind = message.kind();
                match state.handle(from, message) {
                    Ok(outcome) => {
                        tracing::debug!(%from, kind, revision = outcome.revision, "hub accepted");
                        let deliveries = state.deliveries(&outcome);
                        (
                            SyncMessage::Ack(Ack {
                                revision: outcome.revision,
                            }),
                            deliveries,
                        )
                    }
                    Err(SyncError::Rejected { class, reason }) => {
                        tracing::debug!(%from, kind, ?class, %reason, "hub rejected");
                        (SyncMessage::Rejected { class, reason }, Vec::new())
                    }
                    Err(e) => return Err(e),
                }
            };

            // Callbacks run outside the lock so they may call back into the hub.
            for (callback, snapshot) in deliveries {
                callback(snapshot);
            }
            reply.to_bytes()
        }
    }

    /// One user's connection to a [`MemoryHub`].
    #[derive(Clone)]
    pub struct MemoryGateway {
        user: UserId,
        hub: Arc<MemoryHub>,
    }

    impl MemoryGateway {
        pub fn hub(&self) -> &Arc<MemoryHub> {
            &self.hub
        }

        fn round_trip(&self, message: SyncMessage) -> Result<Ack> {
            let request = message.to_bytes()?;
            let reply = self.hub.exchange(&self.user, request)?;
            SyncMessage::from_bytes(&reply)?.into_ack()
        }
    }

    #[async_trait]
    impl SyncGateway for MemoryGateway {
        fn local_user(&self) -> &UserId {
            &self.user
        }

        async fn push_permission_update(&self, change: PermissionChange) -> Result<Ack> {
            self.round_trip(SyncMessage::Permission(change))
        }

        async fn push_lock_update(&self, update: LockUpdate) -> Result<Ack> {
            self.round_trip(SyncMessage::Lock(update))
        }

        async fn request_pairing(&self, pair: &UserId) -> Result<Ack> {
            self.round_trip(SyncMessage::Pair { pair: pair.clone() })
        }

        async fn remove_pairing(&self, pair: &UserId) -> Result<Ack> {
            self.round_trip(SyncMessage::Unpair { pair: pair.clone() })
        }

        async fn request_resync(&self) -> Result<Ack> {
            self.round_trip(SyncMessage::Hello {
                user: self.user.clone(),
                protocol_version: PROTOCOL_VERSION,
            })
        }

        fn on_snapshot(&self, callback: SnapshotCallback) {
            self.hub.subscribe(&self.user, callback);
        }
    }
}
