//! SQLite-backed key/value store for durable local caching.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use super::KeyValueStore;
use crate::error::{Result, SiteSyncError};

/// SQLite-backed key/value store.
///
/// An optional page budget (`PRAGMA max_page_count`) emulates a storage
/// quota: when SQLite reports the database as full the write fails with
/// [`SiteSyncError::QuotaExceeded`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory store for testing.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Cap the database at `pages` pages.
    pub fn with_page_limit(self, pages: u32) -> Result<Self> {
        {
            let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            // max_page_count echoes the effective limit as a row
            let _: i64 =
                conn.query_row(&format!("PRAGMA max_page_count = {}", pages), [], |row| {
                    row.get(0)
                })?;
        }
        Ok(self)
    }
}

/// Map SQLite "database or disk is full" to a quota error.
pub(crate) fn map_write_error(err: rusqlite::Error, key: &str, bytes: usize) -> SiteSyncError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::DiskFull => {
            SiteSyncError::QuotaExceeded {
                key: key.to_string(),
                bytes,
            }
        }
        _ => SiteSyncError::Sqlite(err),
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, chrono::Utc::now().timestamp_millis()],
        )
        .map_err(|e| map_write_error(e, key, key.len() + value.len()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute("DELETE FROM kv WHERE key = ?", params![key])?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }
}
