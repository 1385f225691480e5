//! SQLite-backed remote table.
//!
//! Useful as a self-hosted stand-in for the managed datastore. SQLite has
//! no intermediate caches, so [`CachePolicy`] is ignored.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::table::{CachePolicy, RemoteRecord, RemoteTable};
use crate::BoxFuture;
use crate::error::Result;

/// Remote table stored in a SQLite database.
pub struct SqliteTable {
    conn: Mutex<Connection>,
}

impl SqliteTable {
    /// Open or create the table at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Create an in-memory table for testing.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS site_content (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                version INTEGER
            );
            "#,
        )?;

        // Tables created before the version column existed
        let has_version = conn
            .prepare("SELECT 1 FROM pragma_table_info('site_content') WHERE name = 'version'")?
            .exists([])?;
        if !has_version {
            conn.execute("ALTER TABLE site_content ADD COLUMN version INTEGER", [])?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of rows stored.
    pub fn row_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM site_content", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn select_sync(&self, id: &str) -> Result<Option<RemoteRecord>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let row: Option<(String, String, String, Option<u32>)> = conn
            .query_row(
                "SELECT id, data, updated_at, version FROM site_content WHERE id = ?",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((id, data, updated_at, version)) = row else {
            return Ok(None);
        };

        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(RemoteRecord {
            id,
            data: serde_json::from_str(&data)?,
            updated_at,
            version,
        }))
    }

    fn upsert_sync(&self, record: &RemoteRecord) -> Result<()> {
        let data = serde_json::to_string(&record.data)?;
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO site_content (id, data, updated_at, version) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                version = excluded.version",
            params![record.id, data, record.updated_at.to_rfc3339(), record.version],
        )?;
        Ok(())
    }
}

impl RemoteTable for SqliteTable {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn select<'a>(
        &'a self,
        id: &'a str,
        _policy: CachePolicy,
    ) -> BoxFuture<'a, Result<Option<RemoteRecord>>> {
        Box::pin(async move { self.select_sync(id) })
    }

    fn upsert<'a>(
        &'a self,
        record: &'a RemoteRecord,
        _policy: CachePolicy,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.upsert_sync(record) })
    }
}
