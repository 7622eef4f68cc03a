//! [`StateStore`] backed by a bundled SQLite file.
//!
//! Rows hold CBOR blobs keyed by user id. Queries run on the blocking pool
//! behind a shared connection.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use tether_core::{FullStateSnapshot, PermissionSet, UserId};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{SaveResult, StateStore};

/// Durable snapshot cache. Clones share one connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and bring its schema current.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// A throwaway database that lives as long as the store.
    pub fn open_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(mut conn: Connection) -> Result<Self> {
        migration::migrate(&mut conn)?;
        tracing::debug!(version = migration::SCHEMA_VERSION, "snapshot store ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| StoreError::Task("connection mutex poisoned".into()))
}

fn decode_snapshot(body: &[u8]) -> Result<FullStateSnapshot> {
    let snapshot = FullStateSnapshot::from_bytes(body)?;
    snapshot
        .validate()
        .map_err(|e| StoreError::InvalidData(format!("snapshot of {}: {e}", snapshot.user)))?;
    Ok(snapshot)
}

fn encode_set(perms: &PermissionSet) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(perms, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_set(body: &[u8]) -> Result<PermissionSet> {
    ciborium::from_reader(body).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn save_snapshot(&self, snapshot: &FullStateSnapshot) -> Result<SaveResult> {
        snapshot.validate()?;
        let user = snapshot.user.as_str().to_owned();
        let revision = snapshot.revision;
        let body = snapshot.to_bytes()?;

        self.blocking(move |conn| {
            let stored: Option<i64> = conn
                .query_row(
                    "SELECT revision FROM snapshots WHERE user_id = ?1",
                    params![user],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(stored) = stored {
                if stored as u64 > revision {
                    return Ok(SaveResult::Stale {
                        stored: stored as u64,
                    });
                }
            }

            conn.execute(
                "INSERT INTO snapshots (user_id, revision, body, saved_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id) DO UPDATE SET
                    revision = excluded.revision,
                    body = excluded.body,
                    saved_at = excluded.saved_at",
                params![user, revision as i64, body.as_ref(), now_millis()],
            )?;
            tracing::trace!(user = %user, revision, "snapshot saved");
            Ok(SaveResult::Saved)
        })
        .await
    }

    async fn load_snapshot(&self, user: &UserId) -> Result<Option<FullStateSnapshot>> {
        let user = user.as_str().to_owned();
        self.blocking(move |conn| {
            let body: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT body FROM snapshots WHERE user_id = ?1",
                    params![user],
                    |row| row.get(0),
                )
                .optional()?;
            body.as_deref().map(decode_snapshot).transpose()
        })
        .await
    }

    async fn load_snapshots(&self) -> Result<Vec<FullStateSnapshot>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT body FROM snapshots ORDER BY user_id")?;
            let bodies = stmt
                .query_map([], |row| row.get::<_, Vec<u8>>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            bodies.iter().map(|b| decode_snapshot(b)).collect()
        })
        .await
    }

    async fn delete_snapshot(&self, user: &UserId) -> Result<bool> {
        let user = user.as_str().to_owned();
        self.blocking(move |conn| {
            let removed = conn.execute("DELETE FROM snapshots WHERE user_id = ?1", params![user])?;
            Ok(removed > 0)
        })
        .await
    }

    async fn save_global_defaults(&self, user: &UserId, perms: &PermissionSet) -> Result<()> {
        let user = user.as_str().to_owned();
        let body = encode_set(perms)?;
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO global_defaults (user_id, body, saved_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                    body = excluded.body,
                    saved_at = excluded.saved_at",
                params![user, body, now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    async fn load_global_defaults(&self, user: &UserId) -> Result<Option<PermissionSet>> {
        let user = user.as_str().to_owned();
        self.blocking(move |conn| {
            let body: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT body FROM global_defaults WHERE user_id = ?1",
                    params![user],
                    |row| row.get(0),
                )
                .optional()?;
            body.as_deref().map(decode_set).transpose()
        })
        .await
    }
}
