//! Remote store client with a local last-known-good backup.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::OnceCell;

use super::table::{CachePolicy, MAIN_RECORD_ID, RemoteRecord, RemoteTable};
use crate::cache::{LocalCache, REMOTE_BACKUP_KEY};
use crate::error::Result;
use crate::events::SyncEvent;
use crate::model::CURRENT_VERSION;

/// Builds a connection to the remote table on first use.
pub type RemoteConnector = Box<dyn Fn() -> Result<Arc<dyn RemoteTable>> + Send + Sync>;

/// Last-known-good copy of the site content, kept in the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalBackupRecord {
    /// Site content document.
    pub data: JsonValue,
    /// When this copy was written.
    pub saved_at: DateTime<Utc>,
    /// True until the remote store confirmed the matching upsert.
    #[serde(default)]
    pub pending: bool,
    /// Schema version of `data`, when known.
    #[serde(default)]
    pub version: Option<u32>,
}

/// Where loaded content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// The remote record.
    Remote,
    /// A pending local backup newer than the remote record.
    PendingBackup,
    /// The local backup, because the remote read failed or found nothing.
    Backup,
}

/// Content returned by [`RemoteStoreClient::load`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedContent {
    pub data: JsonValue,
    pub source: LoadSource,
    /// Schema version of `data`, when the source recorded one.
    pub version: Option<u32>,
}

/// Where a [`RemoteStoreClient::save_data`] call left the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteWriteStatus {
    /// The remote record holds the content.
    Synced,
    /// Only the local backup holds the content.
    BackedUpLocally {
        /// Why the remote write did not happen.
        reason: String,
    },
}

impl RemoteWriteStatus {
    /// Whether the remote record was updated.
    pub fn is_synced(&self) -> bool {
        matches!(self, RemoteWriteStatus::Synced)
    }
}

/// Reads and writes the singleton remote record.
///
/// The connection is created lazily, exactly once, on the first call
/// that needs it. A client without a connector, or whose connector
/// failed, behaves as if the remote store were permanently unreachable
/// and serves everything from the local backup.
///
/// Remote errors never escape this type. They are logged, reported on
/// the event stream, and turned into a local fallback.
pub struct RemoteStoreClient {
    connector: Option<RemoteConnector>,
    table: OnceCell<Option<Arc<dyn RemoteTable>>>,
    cache: LocalCache,
    record_id: String,
    backup_key: String,
}

impl RemoteStoreClient {
    /// Create a client that connects with `connector` on first use.
    pub fn new(connector: RemoteConnector, cache: LocalCache) -> Self {
        Self {
            connector: Some(connector),
            table: OnceCell::new(),
            cache,
            record_id: MAIN_RECORD_ID.to_string(),
            backup_key: REMOTE_BACKUP_KEY.to_string(),
        }
    }

    /// Create a client over an already connected table.
    pub fn with_table(table: Arc<dyn RemoteTable>, cache: LocalCache) -> Self {
        Self {
            connector: None,
            table: OnceCell::new_with(Some(Some(table))),
            cache,
            record_id: MAIN_RECORD_ID.to_string(),
            backup_key: REMOTE_BACKUP_KEY.to_string(),
        }
    }

    /// Create a client with no remote store configured.
    pub fn offline(cache: LocalCache) -> Self {
        Self {
            connector: None,
            table: OnceCell::new(),
            cache,
            record_id: MAIN_RECORD_ID.to_string(),
            backup_key: REMOTE_BACKUP_KEY.to_string(),
        }
    }

    /// Use a different cache key for the local backup.
    pub fn with_backup_key(mut self, key: impl Into<String>) -> Self {
        self.backup_key = key.into();
        self
    }

    /// Cache key of the local backup.
    pub fn backup_key(&self) -> &str {
        &self.backup_key
    }

    /// Id of the remote record.
    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// Connect if not done yet. Safe to call any number of times.
    pub async fn initialize(&self) -> Option<Arc<dyn RemoteTable>> {
        self.table
            .get_or_init(|| async {
                let Some(connector) = &self.connector else {
                    log::info!("[remote] No remote store configured, working from local backup");
                    return None;
                };
                match connector() {
                    Ok(table) => {
                        log::info!("[remote] Connected to '{}' remote table", table.name());
                        Some(table)
                    }
                    Err(e) => {
                        log::warn!("[remote] Failed to connect: {}", e);
                        None
                    }
                }
            })
            .await
            .clone()
    }

    /// Whether [`initialize`](Self::initialize) already ran.
    pub fn is_initialized(&self) -> bool {
        self.table.initialized()
    }

    /// The local backup, if one was ever written.
    pub fn backup(&self) -> Option<LocalBackupRecord> {
        self.cache.get_json(&self.backup_key)
    }

    /// Write `content` to the local backup as a pending write.
    ///
    /// Every remote write is staged here before it is attempted.
    pub fn stage(&self, content: &JsonValue, version: Option<u32>) -> LocalBackupRecord {
        let backup = LocalBackupRecord {
            data: content.clone(),
            saved_at: Utc::now(),
            pending: true,
            version,
        };
        if let Err(e) = self.cache.set_json(&self.backup_key, &backup) {
            log::warn!("[remote] Could not write local backup: {}", e);
        }
        backup
    }

    /// Save a current-schema document remotely, backing it up locally first.
    pub async fn save_data(&self, content: &JsonValue) -> RemoteWriteStatus {
        let staged = self.stage(content, Some(CURRENT_VERSION));
        self.upload(&staged, CachePolicy::Default).await
    }

    /// Upsert a write previously passed through [`stage`](Self::stage).
    ///
    /// On success the backup is marked synced, unless a newer write has
    /// been staged since.
    pub async fn upload(
        &self,
        staged: &LocalBackupRecord,
        policy: CachePolicy,
    ) -> RemoteWriteStatus {
        let Some(table) = self.initialize().await else {
            return RemoteWriteStatus::BackedUpLocally {
                reason: "remote store not connected".to_string(),
            };
        };

        let record = RemoteRecord {
            id: self.record_id.clone(),
            data: staged.data.clone(),
            updated_at: staged.saved_at,
            version: staged.version,
        };
        match table.upsert(&record, policy).await {
            Ok(()) => {
                log::debug!("[remote] Saved record '{}'", self.record_id);
                self.confirm(staged);
                RemoteWriteStatus::Synced
            }
            Err(e) => {
                log::warn!("[remote] Save failed, content kept in local backup: {}", e);
                RemoteWriteStatus::BackedUpLocally {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn confirm(&self, staged: &LocalBackupRecord) {
        let Some(current) = self.backup() else {
            return;
        };
        if current.saved_at != staged.saved_at || current.data != staged.data {
            log::debug!("[remote] A newer write is staged, backup stays pending");
            return;
        }
        let confirmed = LocalBackupRecord {
            pending: false,
            ..current
        };
        if let Err(e) = self.cache.set_json(&self.backup_key, &confirmed) {
            log::warn!("[remote] Could not mark local backup as synced: {}", e);
        }
    }

    /// Load content, preferring the remote record over the local backup.
    ///
    /// A pending backup at least as new as the remote record wins, since
    /// it holds a write the remote store never confirmed.
    pub async fn load_data(&self) -> Option<JsonValue> {
        self.load().await.map(|loaded| loaded.data)
    }

    /// Like [`load_data`](Self::load_data), but says where the content came from.
    pub async fn load(&self) -> Option<LoadedContent> {
        self.load_with(CachePolicy::Default).await
    }

    /// [`load`](Self::load) with an explicit transport cache policy.
    pub async fn load_with(&self, policy: CachePolicy) -> Option<LoadedContent> {
        let backup = self.backup();

        let Some(table) = self.initialize().await else {
            return self.fall_back(backup, "remote store not connected".to_string());
        };

        let record = match table.select(&self.record_id, policy).await {
            Ok(Some(record)) => record,
            Ok(None) => return self.fall_back(backup, "remote record missing".to_string()),
            Err(e) => return self.fall_back(backup, e.to_string()),
        };

        if let Some(backup) = backup
            && backup.pending
            && backup.saved_at >= record.updated_at
        {
            log::info!("[remote] Local backup holds an unconfirmed newer write, using it");
            self.cache.events().emit(&SyncEvent::PendingBackupPreferred);
            return Some(LoadedContent {
                data: backup.data,
                source: LoadSource::PendingBackup,
                version: backup.version,
            });
        }

        let repaired = LocalBackupRecord {
            data: record.data.clone(),
            saved_at: record.updated_at,
            pending: false,
            version: record.version,
        };
        if self.cache.set_json(&self.backup_key, &repaired).is_ok() {
            self.cache.events().emit(&SyncEvent::ReadRepaired);
        }

        Some(LoadedContent {
            data: record.data,
            source: LoadSource::Remote,
            version: record.version,
        })
    }

    fn fall_back(
        &self,
        backup: Option<LocalBackupRecord>,
        reason: String,
    ) -> Option<LoadedContent> {
        log::warn!("[remote] Load fell back to local backup: {}", reason);
        self.cache
            .events()
            .emit(&SyncEvent::remote_load_fallback(reason));
        backup.map(|b| LoadedContent {
            data: b.data,
            source: LoadSource::Backup,
            version: b.version,
        })
    }
}

impl fmt::Debug for RemoteStoreClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStoreClient")
            .field("record_id", &self.record_id)
            .field("backup_key", &self.backup_key)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::error::SiteSyncError;
    use crate::events::EventRegistry;
    use crate::remote::MemoryTable;
    use crate::test_utils::record_events;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn memory_cache() -> LocalCache {
        LocalCache::new(Arc::new(MemoryStore::new()), Arc::new(EventRegistry::new()))
    }

    #[tokio::test]
    async fn test_connector_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let client = RemoteStoreClient::new(
            Box::new(move || -> Result<Arc<dyn RemoteTable>> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(MemoryTable::new()))
            }),
            memory_cache(),
        );

        assert!(!client.is_initialized());
        client.initialize().await;
        client.save_data(&json!({"a": 1})).await;
        client.load_data().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let client = RemoteStoreClient::new(
            Box::new(move || -> Result<Arc<dyn RemoteTable>> {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SiteSyncError::RemoteUnavailable("missing credentials".into()))
            }),
            memory_cache(),
        );

        let status = client.save_data(&json!({"a": 1})).await;
        client.save_data(&json!({"a": 2})).await;

        assert!(!status.is_synced());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.load_data().await, Some(json!({"a": 2})));
    }

    #[tokio::test]
    async fn test_successful_save_clears_pending_flag() {
        let table = Arc::new(MemoryTable::new());
        let client = RemoteStoreClient::with_table(table.clone(), memory_cache());

        let status = client.save_data(&json!({"hero": {"title": "x"}})).await;

        assert_eq!(status, RemoteWriteStatus::Synced);
        let backup = client.backup().unwrap();
        assert!(!backup.pending);
        assert_eq!(table.peek(MAIN_RECORD_ID).unwrap().data, backup.data);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_backup_pending() {
        let table = Arc::new(MemoryTable::new());
        table.set_fail_writes(true);
        let client = RemoteStoreClient::with_table(table.clone(), memory_cache());

        let status = client.save_data(&json!({"v": 1})).await;

        assert!(matches!(status, RemoteWriteStatus::BackedUpLocally { .. }));
        assert!(client.backup().unwrap().pending);
        assert_eq!(table.row_count(), 0);
    }

    #[tokio::test]
    async fn test_read_repair_mirrors_remote_into_backup() {
        let table = Arc::new(MemoryTable::with_record(RemoteRecord::new(
            MAIN_RECORD_ID,
            json!({"from": "remote"}),
        )));
        let cache = memory_cache();
        let log = record_events(cache.events());
        let client = RemoteStoreClient::with_table(table, cache);

        let loaded = client.load_data().await;

        assert_eq!(loaded, Some(json!({"from": "remote"})));
        assert_eq!(client.backup().unwrap().data, json!({"from": "remote"}));
        assert_eq!(log.events(), vec![SyncEvent::ReadRepaired]);
    }

    #[tokio::test]
    async fn test_missing_record_falls_back_to_backup() {
        let client = RemoteStoreClient::with_table(Arc::new(MemoryTable::new()), memory_cache());
        assert_eq!(client.load_data().await, None);
    }

    #[tokio::test]
    async fn test_pending_backup_newer_than_remote_wins() {
        let table = Arc::new(MemoryTable::new());
        let client = RemoteStoreClient::with_table(table.clone(), memory_cache());

        client.save_data(&json!({"v": "synced"})).await;
        table.set_fail_writes(true);
        client.save_data(&json!({"v": "unsynced"})).await;

        assert_eq!(client.load_data().await, Some(json!({"v": "unsynced"})));
    }

    #[tokio::test]
    async fn test_confirming_older_write_keeps_newer_backup_pending() {
        let table = Arc::new(MemoryTable::new());
        let client = RemoteStoreClient::with_table(table.clone(), memory_cache());

        let first = client.stage(&json!({"v": 1}), Some(CURRENT_VERSION));
        let second = client.stage(&json!({"v": 2}), Some(CURRENT_VERSION));
        assert!(client.upload(&first, CachePolicy::Default).await.is_synced());

        let backup = client.backup().unwrap();
        assert!(backup.pending);
        assert_eq!(backup.data, json!({"v": 2}));
        assert_eq!(client.load_data().await, Some(json!({"v": 2})));

        assert!(client.upload(&second, CachePolicy::Default).await.is_synced());
        assert!(!client.backup().unwrap().pending);
    }

    #[tokio::test]
    async fn test_version_travels_with_the_record() {
        let table = Arc::new(MemoryTable::new());
        let client = RemoteStoreClient::with_table(table.clone(), memory_cache());

        client.save_data(&json!({"v": 1})).await;

        assert_eq!(table.peek(MAIN_RECORD_ID).unwrap().version, Some(CURRENT_VERSION));
        let loaded = client.load().await.unwrap();
        assert_eq!(loaded.source, LoadSource::Remote);
        assert_eq!(loaded.version, Some(CURRENT_VERSION));
    }

    #[tokio::test]
    async fn test_remote_newer_than_pending_backup_wins() {
        let table = Arc::new(MemoryTable::new());
        table.set_fail_writes(true);
        let client = RemoteStoreClient::with_table(table.clone(), memory_cache());
        client.save_data(&json!({"v": "old local"})).await;

        // Another editor wrote afterwards
        table.set_fail_writes(false);
        let mut newer = RemoteRecord::new(MAIN_RECORD_ID, json!({"v": "other editor"}));
        newer.updated_at = client.backup().unwrap().saved_at + chrono::Duration::seconds(5);
        table.upsert(&newer, CachePolicy::Default).await.unwrap();

        assert_eq!(client.load_data().await, Some(json!({"v": "other editor"})));
        assert!(!client.backup().unwrap().pending);
    }
}
