//! SQLite schema, kept as an ordered list of steps.
//!
//! Step `i` brings the schema to version `i + 1`. Applied versions are
//! recorded in `schema_migrations`, so reopening a database only runs the
//! steps it has not seen.

use rusqlite::{params, Connection};

use crate::error::{Result, StoreError};

/// Schema steps in application order.
const STEPS: &[&str] = &[
    // 1: last authoritative snapshot per user, plus the local user's globals.
    r#"
    CREATE TABLE snapshots (
        user_id TEXT PRIMARY KEY,
        revision INTEGER NOT NULL,
        body BLOB NOT NULL,
        saved_at INTEGER NOT NULL
    );
    CREATE TABLE global_defaults (
        user_id TEXT PRIMARY KEY,
        body BLOB NOT NULL,
        saved_at INTEGER NOT NULL
    );
    "#,
];

/// Version a fully migrated database reports.
pub const SCHEMA_VERSION: u32 = STEPS.len() as u32;

/// Bring `conn` up to [`SCHEMA_VERSION`]. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );",
    )?;

    let applied = schema_version(conn)?;
    if applied > SCHEMA_VERSION {
        return Err(StoreError::Migration(format!(
            "database is at version {applied}, newer than {SCHEMA_VERSION}"
        )));
    }

    let pending = &STEPS[applied as usize..];
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (offset, sql) in pending.iter().enumerate() {
        let version = applied + offset as u32 + 1;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, now_millis()],
        )?;
        tracing::debug!(version, "schema step applied");
    }
    tx.commit()?;
    Ok(())
}

/// Highest recorded version, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<u32> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
