use std::sync::{Arc, Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value as JsonValue;

use crate::error::ServerError;

/// The stored content row
#[derive(Debug, Clone, PartialEq)]
pub struct StoredContent {
    pub content: JsonValue,
    /// Server time of the last accepted save (RFC 3339)
    pub updated_at: String,
    /// Timestamp the client sent with the last save
    pub client_timestamp: Option<String>,
    /// Number of accepted saves
    pub version: u64,
}

/// Content repository over the single-row table
#[derive(Clone)]
pub struct ContentRepo {
    conn: Arc<Mutex<Connection>>,
}

impl ContentRepo {
    /// Create a new ContentRepo with the given connection
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Replace the stored content, bumping the version.
    pub fn save(
        &self,
        content: &JsonValue,
        client_timestamp: &str,
    ) -> Result<StoredContent, ServerError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let data = serde_json::to_string(content)?;
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        conn.execute(
            "INSERT INTO site_content (id, content, updated_at, client_timestamp, version)
             VALUES (1, ?1, ?2, ?3, 1)
             ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                updated_at = excluded.updated_at,
                client_timestamp = excluded.client_timestamp,
                version = site_content.version + 1",
            params![data, now, client_timestamp],
        )?;

        let version: i64 =
            conn.query_row("SELECT version FROM site_content WHERE id = 1", [], |row| {
                row.get(0)
            })?;

        Ok(StoredContent {
            content: content.clone(),
            updated_at: now,
            client_timestamp: Some(client_timestamp.to_string()),
            version: version as u64,
        })
    }

    /// Get the stored content, if anything was ever saved.
    pub fn get(&self) -> Result<Option<StoredContent>, ServerError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let row = conn
            .query_row(
                "SELECT content, updated_at, client_timestamp, version FROM site_content WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((data, updated_at, client_timestamp, version)) = row else {
            return Ok(None);
        };

        Ok(Some(StoredContent {
            content: serde_json::from_str(&data)?,
            updated_at,
            client_timestamp,
            version: version as u64,
        }))
    }

    /// Delete the stored content. Returns whether a row existed.
    pub fn clear(&self) -> Result<bool, ServerError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let deleted = conn.execute("DELETE FROM site_content", [])?;
        Ok(deleted > 0)
    }
}
