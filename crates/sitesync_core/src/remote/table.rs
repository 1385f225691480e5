//! Remote table abstraction and in-memory backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::BoxFuture;
use crate::error::{Result, SiteSyncError};

/// Id of the only row the site ever reads or writes.
pub const MAIN_RECORD_ID: &str = "main";

/// The single row holding the whole site's content remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Fixed singleton id ([`MAIN_RECORD_ID`]).
    pub id: String,
    /// Site content document.
    pub data: JsonValue,
    /// Time of the last upsert.
    pub updated_at: DateTime<Utc>,
    /// Schema version of `data`. `None` on rows written before versions
    /// were recorded.
    #[serde(default)]
    pub version: Option<u32>,
}

impl RemoteRecord {
    /// Build an unversioned record stamped with the current time.
    pub fn new(id: impl Into<String>, data: JsonValue) -> Self {
        Self {
            id: id.into(),
            data,
            updated_at: Utc::now(),
            version: None,
        }
    }

    /// Tag the record with the schema version of its content.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }
}

/// Transport caching behavior for a remote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Let the transport and intermediaries cache as usual.
    #[default]
    Default,
    /// Send no-cache directives and a cache-busting query parameter.
    Bypass,
}

/// Trait for the managed remote datastore.
///
/// Implementations hold at most one row per id: `upsert` replaces an
/// existing row instead of inserting a duplicate.
pub trait RemoteTable: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> &str;

    /// Read the row with `id`, or `None` if it was never written.
    fn select<'a>(
        &'a self,
        id: &'a str,
        policy: CachePolicy,
    ) -> BoxFuture<'a, Result<Option<RemoteRecord>>>;

    /// Insert or replace the row with `record.id`.
    fn upsert<'a>(
        &'a self,
        record: &'a RemoteRecord,
        policy: CachePolicy,
    ) -> BoxFuture<'a, Result<()>>;
}

/// In-memory remote table for tests and offline development.
///
/// Reads and writes can be switched to fail to simulate an unreachable
/// backend. Every request's [`CachePolicy`] is recorded.
#[derive(Debug, Default)]
pub struct MemoryTable {
    rows: RwLock<HashMap<String, RemoteRecord>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    selects: AtomicUsize,
    upserts: AtomicUsize,
    policies: Mutex<Vec<CachePolicy>>,
}

impl MemoryTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table that already holds `record`.
    pub fn with_record(record: RemoteRecord) -> Self {
        let table = Self::new();
        table
            .rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id.clone(), record);
        table
    }

    /// Make every read fail (or succeed again).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of rows stored.
    pub fn row_count(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Current row for `id`, bypassing failure injection.
    pub fn peek(&self, id: &str) -> Option<RemoteRecord> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Number of select calls received.
    pub fn select_count(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    /// Number of upsert calls received.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Cache policies of all requests so far, in order.
    pub fn policies(&self) -> Vec<CachePolicy> {
        self.policies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_policy(&self, policy: CachePolicy) {
        self.policies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(policy);
    }
}

impl RemoteTable for MemoryTable {
    fn name(&self) -> &str {
        "memory"
    }

    fn select<'a>(
        &'a self,
        id: &'a str,
        policy: CachePolicy,
    ) -> BoxFuture<'a, Result<Option<RemoteRecord>>> {
        Box::pin(async move {
            self.selects.fetch_add(1, Ordering::SeqCst);
            self.record_policy(policy);
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(SiteSyncError::RemoteUnavailable(
                    "simulated network failure".to_string(),
                ));
            }
            Ok(self.peek(id))
        })
    }

    fn upsert<'a>(
        &'a self,
        record: &'a RemoteRecord,
        policy: CachePolicy,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            self.record_policy(policy);
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(SiteSyncError::RemoteUnavailable(
                    "simulated network failure".to_string(),
                ));
            }
            self.rows
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(record.id.clone(), record.clone());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_upsert_replaces_existing_row() {
        let table = MemoryTable::new();

        table
            .upsert(&RemoteRecord::new(MAIN_RECORD_ID, json!({"v": 1})), CachePolicy::Default)
            .await
            .unwrap();
        table
            .upsert(&RemoteRecord::new(MAIN_RECORD_ID, json!({"v": 2})), CachePolicy::Default)
            .await
            .unwrap();

        assert_eq!(table.row_count(), 1);
        let row = table.select(MAIN_RECORD_ID, CachePolicy::Default).await.unwrap();
        assert_eq!(row.unwrap().data, json!({"v": 2}));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let table = MemoryTable::new();
        table.set_fail_reads(true);
        table.set_fail_writes(true);

        assert!(table.select(MAIN_RECORD_ID, CachePolicy::Bypass).await.is_err());
        let record = RemoteRecord::new(MAIN_RECORD_ID, json!({}));
        assert!(table.upsert(&record, CachePolicy::Default).await.is_err());

        assert_eq!(table.row_count(), 0);
        assert_eq!(table.policies(), vec![CachePolicy::Bypass, CachePolicy::Default]);
    }
}
