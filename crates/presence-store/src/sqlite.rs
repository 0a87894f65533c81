//! SQLite-backed key-value substrate.
//!
//! Stores each logical document as one row of a `kv` table. Updates run in
//! `BEGIN IMMEDIATE` transactions, so separate processes sharing the file
//! (daemon and CLI) serialize their read-modify-write sequences.

use crate::error::Result;
use crate::kv::{lock, KeyValueStore, StoreKey, UpdateFn};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// How long a writer waits for another handle's transaction to finish.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_VALUE: &str = "SELECT value FROM kv WHERE key = ?1";
const UPSERT_VALUE: &str = "INSERT INTO kv (key, value) VALUES (?1, ?2)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path`.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };
        store.initialize()?;

        tracing::info!(path = %store.db_path.display(), "opened sqlite store");
        Ok(store)
    }

    /// In-memory database (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            db_path: PathBuf::from(":memory:"),
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn initialize(&self) -> Result<()> {
        let conn = lock(&self.conn)?;
        if let Err(e) = conn.busy_timeout(BUSY_TIMEOUT) {
            tracing::warn!(error = %e, "failed to set sqlite busy timeout");
        }
        if let Err(e) =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
        {
            tracing::warn!(error = %e, "failed to enable WAL journal mode");
        }
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>> {
        let conn = lock(&self.conn)?;
        let value = conn
            .query_row(SELECT_VALUE, params![key.as_str()], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute(UPSERT_VALUE, params![key.as_str(), value])?;
        Ok(())
    }

    fn remove(&self, key: StoreKey) -> Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key.as_str()])?;
        Ok(())
    }

    fn update(&self, key: StoreKey, f: &mut UpdateFn<'_>) -> Result<()> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current: Option<String> = tx
            .query_row(SELECT_VALUE, params![key.as_str()], |row| row.get(0))
            .optional()?;
        // Dropping `tx` on error rolls back.
        if let Some(value) = f(current)? {
            tx.execute(UPSERT_VALUE, params![key.as_str(), value])?;
        }
        tx.commit()?;
        Ok(())
    }
}
