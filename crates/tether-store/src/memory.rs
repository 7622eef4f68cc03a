//! Volatile [`StateStore`]: the SQLite store's rules without the file.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use tether_core::{FullStateSnapshot, PermissionSet, UserId};

use crate::error::Result;
use crate::traits::{SaveResult, StateStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    snapshots: BTreeMap<UserId, FullStateSnapshot>,
    global_defaults: HashMap<UserId, PermissionSet>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn save_snapshot(&self, snapshot: &FullStateSnapshot) -> Result<SaveResult> {
        snapshot.validate()?;
        let mut tables = self.write();
        let stored = tables.snapshots.get(&snapshot.user).map(|s| s.revision);
        if let Some(stored) = stored.filter(|&r| r > snapshot.revision) {
            return Ok(SaveResult::Stale { stored });
        }
        tables
            .snapshots
            .insert(snapshot.user.clone(), snapshot.clone());
        Ok(SaveResult::Saved)
    }

    async fn load_snapshot(&self, user: &UserId) -> Result<Option<FullStateSnapshot>> {
        Ok(self.read().snapshots.get(user).cloned())
    }

    async fn load_snapshots(&self) -> Result<Vec<FullStateSnapshot>> {
        Ok(self.read().snapshots.values().cloned().collect())
    }

    async fn delete_snapshot(&self, user: &UserId) -> Result<bool> {
        Ok(self.write().snapshots.remove(user).is_some())
    }

    async fn save_global_defaults(&self, user: &UserId, perms: &PermissionSet) -> Result<()> {
        self.write()
            .global_defaults
            .insert(user.clone(), perms.clone());
        Ok(())
    }

    async fn load_global_defaults(&self, user: &UserId) -> Result<Option<PermissionSet>> {
        Ok(self.read().global_defaults.get(user).cloned())
    }
}
