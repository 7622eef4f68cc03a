//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;

use tether::{Client, ClientConfig, Result};
use tether_core::{PermissionName, PermissionValue, UserId};
use tether_perms::PermissionStore;
use tether_store::MemoryStore;
use tether_sync::{MemoryGateway, MemoryHub};

/// A client on the in-memory hub with an in-memory store.
pub type TestClient = Client<MemoryGateway, MemoryStore>;

/// A fresh user id that won't collide with any other.
pub fn random_uid() -> UserId {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    UserId::new(format!("user-{suffix}"))
}

/// A permission store in which every two of `users` are paired.
pub fn paired_store(users: &[UserId]) -> PermissionStore {
    let mut store = PermissionStore::new();
    for (i, a) in users.iter().enumerate() {
        store.register_user(a);
        for b in &users[i + 1..] {
            store.establish_pair(a, b);
        }
    }
    store
}

/// An owner and a pair, connected through one hub and already paired.
pub struct PairFixture {
    pub hub: Arc<MemoryHub>,
    pub owner: TestClient,
    pub pair: TestClient,
}

impl PairFixture {
    pub async fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default()).await
    }

    pub async fn with_config(config: ClientConfig) -> Result<Self> {
        let hub = MemoryHub::new();
        let mut owner = Client::new(hub.connect(random_uid()), MemoryStore::new(), config.clone())?;
        let pair = Client::new(hub.connect(random_uid()), MemoryStore::new(), config)?;
        owner.pair_with(pair.local_user()).await?;

        let mut fixture = Self { hub, owner, pair };
        fixture.settle().await?;
        Ok(fixture)
    }

    pub fn owner_id(&self) -> UserId {
        self.owner.local_user().clone()
    }

    pub fn pair_id(&self) -> UserId {
        self.pair.local_user().clone()
    }

    /// Apply every snapshot delivered to either side.
    pub async fn settle(&mut self) -> Result<()> {
        self.owner.process_snapshots().await?;
        self.pair.process_snapshots().await?;
        Ok(())
    }

    /// The owner grants the pair `name`, then both sides settle.
    pub async fn grant(&mut self, name: PermissionName, value: impl Into<PermissionValue>) -> Result<()> {
        let (owner, pair) = (self.owner_id(), self.pair_id());
        self.owner
            .set_pair_permission(&owner, &pair, name, value)
            .await?;
        self.settle().await
    }
}
