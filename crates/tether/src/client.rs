//! The Client: one user's view of the permission and lock system.
//!
//! The client owns the local arenas (permission store and lockable
//! registry), runs every request through the lock authority and the
//! permission negotiator, pushes the outcome through a [`SyncGateway`] and
//! folds authoritative snapshots back in. Only the local user's own state
//! is written optimistically; everything else changes when a snapshot says
//! so.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use tether_core::{
    FullStateSnapshot, LockAction, LockAuthority, Lockable, LockableId, LockableRegistry,
    PermissionName, PermissionValue, Slot, Timestamp, UserId,
};
use tether_perms::{HardcoreState, PermissionChange, PermissionNegotiator, PermissionStore};
use tether_store::{SaveResult, StateStore};
use tether_sync::{LockStep, LockUpdate, PendingLedger, ReconcileReport, SyncGateway};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// How current the local copy of a user's state is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Last set by a snapshot received over the gateway.
    Live,
    /// Restored from the state store and not yet confirmed.
    Stale,
}

/// An item transition waiting for the next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    pub owner: UserId,
    pub slot: Slot,
    pub action: LockAction,
}

impl LockRequest {
    pub fn new(owner: &UserId, slot: Slot, action: LockAction) -> Self {
        Self {
            owner: owner.clone(),
            slot,
            action,
        }
    }
}

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Items whose timer ran out.
    pub expired: Vec<LockableId>,
    /// Queued requests that went through.
    pub applied: Vec<LockableId>,
    /// Queued requests that failed, with the reason.
    pub rejected: Vec<(LockRequest, ClientError)>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.applied.is_empty() && self.rejected.is_empty()
    }
}

/// One user's client.
pub struct Client<G: SyncGateway, S: StateStore> {
    local: UserId,
    gateway: G,
    store: Arc<S>,
    config: ClientConfig,
    authority: LockAuthority,
    negotiator: PermissionNegotiator,
    perms: PermissionStore,
    lockables: LockableRegistry,
    pending: PendingLedger,
    queue: VecDeque<LockRequest>,
    freshness: HashMap<UserId, Freshness>,
    revisions: HashMap<UserId, u64>,
    /// Last snapshot accepted per user; the rollback target.
    authoritative: HashMap<UserId, FullStateSnapshot>,
    inbox: mpsc::UnboundedReceiver<FullStateSnapshot>,
}

impl<G: SyncGateway, S: StateStore> Client<G, S> {
    /// Create a client for the gateway's user with default local state.
    ///
    /// Fails with [`ClientError::Config`] when `config` does not validate.
    pub fn new(gateway: G, store: S, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let local = gateway.local_user().clone();

        let (tx, inbox) = mpsc::unbounded_channel();
        gateway.on_snapshot(Box::new(move |snapshot| {
            // Fails only once the client is gone.
            let _ = tx.send(snapshot);
        }));

        let mut perms = PermissionStore::new();
        perms.register_user(&local);
        let mut lockables = LockableRegistry::new();
        lockables.register_user(&local);

        let mut authoritative = HashMap::new();
        authoritative.insert(local.clone(), FullStateSnapshot::initial(local.clone()));

        Ok(Self {
            negotiator: PermissionNegotiator::local(local.clone()),
            authority: LockAuthority::new(config.expiry),
            local,
            gateway,
            store: Arc::new(store),
            config,
            perms,
            lockables,
            pending: PendingLedger::new(),
            queue: VecDeque::new(),
            freshness: HashMap::new(),
            revisions: HashMap::new(),
            authoritative,
            inbox,
        })
    }

    /// Create a client and load the last persisted state, marked stale.
    pub async fn restore(gateway: G, store: S, config: ClientConfig) -> Result<Self> {
        let mut client = Self::new(gateway, store, config)?;

        let mut restored_self = false;
        let snapshots = client.store.load_snapshots().await?;
        let count = snapshots.len();
        for snapshot in snapshots {
            if let Err(e) = snapshot.validate() {
                tracing::warn!(user = %snapshot.user, error = %e, "skipping invalid stored snapshot");
                continue;
            }
            restored_self |= snapshot.user == client.local;
            client.install(snapshot, Freshness::Stale);
        }

        if !restored_self {
            if let Some(globals) = client.store.load_global_defaults(&client.local).await? {
                if let Some(baseline) = client.authoritative.get_mut(&client.local) {
                    baseline.global_perms = globals.clone();
                }
                client.perms.replace_globals(&client.local, globals);
            }
        }

        tracing::info!(user = %client.local, snapshots = count, "restored client state");
        Ok(client)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn local_user(&self) -> &UserId {
        &self.local
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn permissions(&self) -> &PermissionStore {
        &self.perms
    }

    pub fn lockables(&self) -> &LockableRegistry {
        &self.lockables
    }

    pub fn item(&self, owner: &UserId, slot: Slot) -> Option<&Lockable> {
        self.lockables.get_slot(owner, slot)
    }

    pub fn freshness(&self, user: &UserId) -> Option<Freshness> {
        self.freshness.get(user).copied()
    }

    pub fn revision(&self, user: &UserId) -> Option<u64> {
        self.revisions.get(user).copied()
    }

    pub fn pending(&self) -> &PendingLedger {
        &self.pending
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pairing
    // ─────────────────────────────────────────────────────────────────────────

    /// Pair with `pair`. Both directions start at defaults.
    pub async fn pair_with(&mut self, pair: &UserId) -> Result<()> {
        self.gateway.request_pairing(pair).await?;
        self.perms.establish_pair(&self.local, pair);
        self.lockables.register_user(pair);
        tracing::info!(user = %self.local, %pair, "paired");
        Ok(())
    }

    /// Tear down the pairing with `pair`, abandoning changes in flight.
    pub async fn unpair(&mut self, pair: &UserId) -> Result<()> {
        self.gateway.remove_pairing(pair).await?;
        self.perms.remove_pair(&self.local, pair);
        let abandoned = self.forget(pair).await?;
        tracing::info!(user = %self.local, %pair, abandoned, "unpaired");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permission Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Change one of the local user's global permissions.
    pub async fn set_own_permission(
        &mut self,
        name: PermissionName,
        value: impl Into<PermissionValue>,
    ) -> Result<PermissionChange> {
        let change = self.negotiator.set_own_permission(
            &mut self.perms,
            &self.local,
            name,
            value.into(),
            &self.local,
        )?;
        self.push_changes(std::slice::from_ref(&change)).await?;
        Ok(change)
    }

    /// Change what `owner` grants `pair`.
    ///
    /// The local user is either the owner, or the pair acting through edit
    /// access. In the second case nothing changes locally until the owner's
    /// snapshot arrives.
    pub async fn set_pair_permission(
        &mut self,
        owner: &UserId,
        pair: &UserId,
        name: PermissionName,
        value: impl Into<PermissionValue>,
    ) -> Result<PermissionChange> {
        let change = self.negotiator.set_pair_permission(
            &mut self.perms,
            owner,
            pair,
            name,
            value.into(),
            &self.local,
        )?;
        self.push_changes(std::slice::from_ref(&change)).await?;
        Ok(change)
    }

    /// Let `pair` edit one of the pair permissions granted to them.
    pub async fn set_edit_access(
        &mut self,
        pair: &UserId,
        name: PermissionName,
        allowed: bool,
    ) -> Result<PermissionChange> {
        let change = self.negotiator.set_edit_access(
            &mut self.perms,
            &self.local,
            pair,
            name,
            allowed,
            &self.local,
        )?;
        self.push_changes(std::slice::from_ref(&change)).await?;
        Ok(change)
    }

    /// Change a hardcore flag of the local user's relationship with `pair`.
    pub async fn set_hardcore_permission(
        &mut self,
        pair: &UserId,
        name: PermissionName,
        value: impl Into<PermissionValue>,
    ) -> Result<Vec<PermissionChange>> {
        let changes = self.negotiator.set_hardcore_permission(
            &mut self.perms,
            &self.local,
            pair,
            name,
            value.into(),
            &self.local,
        )?;
        self.push_changes(&changes).await?;
        Ok(changes)
    }

    /// Force (or release) a hardcore state on `owner` as their enabler.
    pub async fn force_state(
        &mut self,
        owner: &UserId,
        state: HardcoreState,
        active: bool,
    ) -> Result<PermissionChange> {
        let change = self.negotiator.force_state(
            &mut self.perms,
            owner,
            &self.local,
            state,
            active,
            &self.local,
        )?;
        self.push_changes(std::slice::from_ref(&change)).await?;
        Ok(change)
    }

    /// Lock (or unlock) `owner`'s chat garbler as their enabler.
    pub async fn lock_garbler(&mut self, owner: &UserId, locked: bool) -> Result<Vec<PermissionChange>> {
        let changes = self.negotiator.lock_garbler(
            &mut self.perms,
            owner,
            &self.local,
            locked,
            &self.local,
        )?;
        self.push_changes(&changes).await?;
        Ok(changes)
    }

    /// Push changes in order, recording the locally written ones.
    async fn push_changes(&mut self, changes: &[PermissionChange]) -> Result<()> {
        for change in changes {
            let written = self.negotiator.scope().may_write(&change.owner);
            if written {
                self.pending.record_permission(change.clone());
            }
            match self.gateway.push_permission_update(change.clone()).await {
                Ok(ack) => {
                    if written {
                        self.pending.acknowledge(&change.owner, ack.revision);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        owner = %change.owner,
                        name = %change.name,
                        error = %e,
                        "permission push failed"
                    );
                    self.rollback(&change.owner).await;
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Item Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Run `action` on `owner`'s item in `slot` right away.
    pub async fn transition(
        &mut self,
        owner: &UserId,
        slot: Slot,
        action: LockAction,
        now: Timestamp,
    ) -> Result<Lockable> {
        let item = self
            .lockables
            .get_slot(owner, slot)
            .cloned()
            .ok_or_else(|| ClientError::UnknownLockable {
                owner: owner.clone(),
                slot,
            })?;
        let own = owner == &self.local;
        let grants = if own {
            None
        } else {
            self.perms.grants(owner, &self.local)
        };
        let authority = self.authority_for(owner);
        let next = authority.try_transition(&item, &action, grants, &self.local, now)?;

        if own {
            self.lockables.put(next.clone())?;
            self.pending.record_lock(owner.clone(), next.clone());
        }

        let update = LockUpdate {
            owner: owner.clone(),
            requester: self.local.clone(),
            lockable_id: next.id,
            step: LockStep::Action(action.clone()),
            at: now,
            expiry: authority.expiry_policy(),
            new_state: next.clone(),
            prev_kind: item.padlock.kind,
        };
        match self.gateway.push_lock_update(update).await {
            Ok(ack) if own => self.pending.acknowledge(owner, ack.revision),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(%owner, ?slot, action = action.name(), error = %e, "lock push failed");
                self.rollback(owner).await;
                return Err(e.into());
            }
        }

        tracing::debug!(%owner, ?slot, action = action.name(), kind = %next.padlock.kind, "transition applied");
        Ok(next)
    }

    /// Queue a transition for the next tick.
    pub fn enqueue(&mut self, request: LockRequest) -> Result<()> {
        if self.queue.len() >= self.config.max_queued_requests {
            return Err(ClientError::QueueFull(self.queue.len()));
        }
        self.queue.push_back(request);
        Ok(())
    }

    /// Release elapsed timers, then run every queued request.
    ///
    /// Expiry is applied to every known item, but only the local user's
    /// own releases are pushed.
    pub async fn tick(&mut self, now: Timestamp) -> TickReport {
        let mut report = TickReport::default();

        let expiring: Vec<(Lockable, Lockable)> = self
            .lockables
            .iter()
            .filter_map(|item| {
                self.authority_for(&item.owner)
                    .expire(item, now)
                    .map(|next| (item.clone(), next))
            })
            .collect();

        for (item, next) in expiring {
            if let Err(e) = self.lockables.put(next.clone()) {
                tracing::warn!(id = %item.id, error = %e, "could not release timer");
                continue;
            }
            report.expired.push(next.id);
            if item.owner != self.local {
                continue;
            }

            self.pending.record_lock(item.owner.clone(), next.clone());
            let update = LockUpdate {
                owner: item.owner.clone(),
                requester: self.local.clone(),
                lockable_id: next.id,
                step: LockStep::Expire,
                at: now,
                expiry: self.authority.expiry_policy(),
                new_state: next,
                prev_kind: item.padlock.kind,
            };
            match self.gateway.push_lock_update(update).await {
                Ok(ack) => self.pending.acknowledge(&item.owner, ack.revision),
                Err(e) => {
                    tracing::warn!(id = %item.id, error = %e, "expiry push failed");
                    self.rollback(&item.owner).await;
                }
            }
        }

        while let Some(request) = self.queue.pop_front() {
            let action = request.action.clone();
            match self.transition(&request.owner, request.slot, action, now).await {
                Ok(item) => report.applied.push(item.id),
                Err(e) => report.rejected.push((request, e)),
            }
        }

        report
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Snapshots
    // ─────────────────────────────────────────────────────────────────────────

    /// Fold one authoritative snapshot into local state.
    ///
    /// Snapshots older than the live copy are ignored. A pair's snapshot is
    /// narrowed to what they grant the local user; one that grants nothing
    /// means the pairing is gone.
    pub async fn apply_snapshot(&mut self, snapshot: FullStateSnapshot) -> Result<ReconcileReport> {
        snapshot.validate()?;
        let user = snapshot.user.clone();

        if self.freshness(&user) == Some(Freshness::Live) {
            if let Some(known) = self.revision(&user) {
                if snapshot.revision < known {
                    tracing::debug!(%user, revision = snapshot.revision, known, "ignoring older snapshot");
                    return Ok(ReconcileReport::default());
                }
            }
        }

        let snapshot = if user == self.local {
            snapshot
        } else {
            match self.view_of(snapshot) {
                Some(view) => view,
                None => {
                    if self.is_tracked(&user) {
                        self.forget(&user).await?;
                    }
                    return Ok(ReconcileReport::default());
                }
            }
        };

        let report = self.pending.reconcile(&snapshot);

        if self.config.persist_snapshots {
            if let SaveResult::Stale { stored } = self.store.save_snapshot(&snapshot).await? {
                tracing::debug!(%user, revision = snapshot.revision, stored, "store holds a newer snapshot");
            }
            if user == self.local {
                self.store
                    .save_global_defaults(&user, &snapshot.global_perms)
                    .await?;
            }
        }

        // Own changes acknowledged past this revision are still in flight;
        // keep the local view until a snapshot catches up with them.
        let caught_up = !self.pending.iter().any(|change| change.owner() == &user);
        if caught_up {
            self.install(snapshot, Freshness::Live);
        } else {
            tracing::trace!(%user, revision = snapshot.revision, "snapshot behind pending changes");
            self.remember(snapshot, Freshness::Live);
        }
        Ok(report)
    }

    /// Apply every snapshot delivered since the last call.
    pub async fn process_snapshots(&mut self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        while let Ok(snapshot) = self.inbox.try_recv() {
            report.merge(self.apply_snapshot(snapshot).await?);
        }
        Ok(report)
    }

    /// Ask for fresh snapshots and apply them.
    pub async fn sync(&mut self) -> Result<ReconcileReport> {
        self.gateway.request_resync().await?;
        self.process_snapshots().await
    }

    /// The configured expiry policy applies to the local user's items only;
    /// a pair's items are released keeping their content.
    fn authority_for(&self, owner: &UserId) -> LockAuthority {
        if owner == &self.local {
            self.authority
        } else {
            LockAuthority::default()
        }
    }

    fn view_of(&self, mut snapshot: FullStateSnapshot) -> Option<FullStateSnapshot> {
        let granted = snapshot.pair_perms.remove(&self.local)?;
        snapshot.pair_perms.clear();
        snapshot.pair_perms.insert(self.local.clone(), granted);
        Some(snapshot)
    }

    fn is_tracked(&self, user: &UserId) -> bool {
        self.revisions.contains_key(user) || self.lockables.owned_by(user).next().is_some()
    }

    fn install(&mut self, snapshot: FullStateSnapshot, freshness: Freshness) {
        self.perms.replace_user(&snapshot);
        self.lockables
            .replace_user(&snapshot.user, snapshot.lockables.values().cloned());
        self.remember(snapshot, freshness);
    }

    /// Keep `snapshot` as the rollback target without touching the view.
    fn remember(&mut self, snapshot: FullStateSnapshot, freshness: Freshness) {
        let user = snapshot.user.clone();
        self.revisions.insert(user.clone(), snapshot.revision);
        self.freshness.insert(user.clone(), freshness);
        self.authoritative.insert(user, snapshot);
    }

    /// Drop everything known about `user`. Returns abandoned changes.
    async fn forget(&mut self, user: &UserId) -> Result<usize> {
        let abandoned = self.pending.abandon_pair(&self.local, user);
        self.perms.remove_user(user);
        self.lockables.remove_user(user);
        self.revisions.remove(user);
        self.freshness.remove(user);
        self.authoritative.remove(user);
        if self.config.persist_snapshots {
            self.store.delete_snapshot(user).await?;
        }
        tracing::debug!(%user, abandoned, "forgot user");
        Ok(abandoned)
    }

    /// Return `owner`'s state to the last authoritative snapshot.
    async fn rollback(&mut self, owner: &UserId) {
        let dropped = self.pending.discard_user(owner);
        if let Some(snapshot) = self.authoritative.get(owner).cloned() {
            self.perms.replace_user(&snapshot);
            self.lockables
                .replace_user(owner, snapshot.lockables.values().cloned());
        }
        tracing::debug!(%owner, dropped, "rolled back to authoritative state");

        if let Err(e) = self.gateway.request_resync().await {
            tracing::warn!(error = %e, "resync request failed");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Driver
    // ─────────────────────────────────────────────────────────────────────────

    /// Drive the client until `shutdown` turns true or its sender is dropped.
    ///
    /// Ticks on the configured interval and applies snapshots as they are
    /// delivered.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(user = %self.local, interval = ?self.config.tick_interval, "client running");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick(now_millis()).await;
                    for (request, e) in &report.rejected {
                        tracing::warn!(owner = %request.owner, slot = ?request.slot, error = %e, "queued request rejected");
                    }
                    if !report.is_empty() {
                        tracing::debug!(
                            expired = report.expired.len(),
                            applied = report.applied.len(),
                            rejected = report.rejected.len(),
                            "tick"
                        );
                    }
                }
                Some(snapshot) = self.inbox.recv() => {
                    let user = snapshot.user.clone();
                    if let Err(e) = self.apply_snapshot(snapshot).await {
                        tracing::warn!(%user, error = %e, "dropping snapshot");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(user = %self.local, "client stopped");
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> Timestamp {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}
