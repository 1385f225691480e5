//! Local cache adapter.
//!
//! This module defines the [`KeyValueStore`] trait which abstracts over
//! durable key/value backends (SQLite on native, memory for tests and
//! ephemeral clients), and [`LocalCache`], the forgiving adapter every
//! other component writes through.
//!
//! # Failure model
//!
//! * `set` recovers from a quota error by evicting the value at the same
//!   key and retrying exactly once. If that also fails the error is
//!   returned so the caller can warn the user; nothing is rolled back.
//! * `get` and `remove` never fail: errors are logged and read as "no value".

mod memory;
#[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
mod sqlite;

pub use memory::MemoryStore;
#[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
pub use sqlite::SqliteStore;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::events::{EventRegistry, SyncEvent};

/// Key holding the serialized persisted envelope.
pub const CONTENT_KEY: &str = "site-content-storage";

/// Key holding the remote store client's last-known-good backup.
pub const REMOTE_BACKUP_KEY: &str = "site-content-backup";

/// Key holding the alternate backend's fallback backup.
pub const SERVER_BACKUP_KEY: &str = "site-content-server-backup";

/// Trait for durable key/value storage backends.
///
/// Implementations report a full store as
/// [`SiteSyncError::QuotaExceeded`](crate::error::SiteSyncError::QuotaExceeded)
/// so [`LocalCache`] can recover from it.
pub trait KeyValueStore: Send + Sync {
    /// Read the value at `key`, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` at `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove the value at `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// List all keys.
    fn keys(&self) -> Result<Vec<String>>;
}

/// Result of [`LocalCache::clear_except`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ClearReport {
    /// Keys removed.
    pub removed: usize,
    /// Keys kept because they were on the preserve list.
    pub preserved: usize,
}

/// Best-effort adapter over a [`KeyValueStore`].
#[derive(Clone)]
pub struct LocalCache {
    store: Arc<dyn KeyValueStore>,
    events: Arc<EventRegistry>,
}

impl LocalCache {
    /// Wrap a store.
    pub fn new(store: Arc<dyn KeyValueStore>, events: Arc<EventRegistry>) -> Self {
        Self { store, events }
    }

    /// Read a value. Backend errors are logged and read as `None`.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("[cache] Failed to read '{}': {}", key, e);
                None
            }
        }
    }

    /// Write a value, evicting and retrying once on a quota error.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let err = match self.store.set(key, value) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if !err.is_quota_exceeded() {
            log::error!("[cache] Failed to write '{}': {}", key, err);
            self.events.emit(&SyncEvent::local_write_failed(key, &err));
            return Err(err);
        }

        log::warn!("[cache] Quota exceeded writing '{}', evicting old value", key);
        if let Err(e) = self.store.remove(key) {
            log::warn!("[cache] Failed to evict '{}': {}", key, e);
        }

        match self.store.set(key, value) {
            Ok(()) => {
                self.events.emit(&SyncEvent::LocalWriteRecovered {
                    key: key.to_string(),
                });
                Ok(())
            }
            Err(retry_err) => {
                log::error!("[cache] Retry failed for '{}': {}", key, retry_err);
                self.events
                    .emit(&SyncEvent::local_write_failed(key, &retry_err));
                Err(retry_err)
            }
        }
    }

    /// Remove a value. Backend errors are logged and ignored.
    pub fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            log::warn!("[cache] Failed to remove '{}': {}", key, e);
        }
    }

    /// List keys. Backend errors are logged and read as an empty list.
    pub fn keys(&self) -> Vec<String> {
        self.store.keys().unwrap_or_else(|e| {
            log::warn!("[cache] Failed to list keys: {}", e);
            Vec::new()
        })
    }

    /// Remove every key that is not in `preserve`.
    pub fn clear_except(&self, preserve: &[&str]) -> ClearReport {
        let mut report = ClearReport::default();
        for key in self.keys() {
            if preserve.contains(&key.as_str()) {
                report.preserved += 1;
            } else {
                self.remove(&key);
                report.removed += 1;
            }
        }
        report
    }

    /// Read and deserialize a JSON value. Unparseable values read as `None`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("[cache] Ignoring malformed JSON at '{}': {}", key, e);
                None
            }
        }
    }

    /// Serialize and write a JSON value.
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }

    /// The event registry this cache reports to.
    pub fn events(&self) -> &Arc<EventRegistry> {
        &self.events
    }
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SiteSyncError;
    use crate::test_utils::{FailingStore, record_events};

    fn cache_with(store: Arc<dyn KeyValueStore>) -> (LocalCache, Arc<EventRegistry>) {
        let events = Arc::new(EventRegistry::new());
        (LocalCache::new(store, events.clone()), events)
    }

    #[test]
    fn test_set_and_get() {
        let (cache, _) = cache_with(Arc::new(MemoryStore::new()));
        cache.set("k", "v").unwrap();
        assert_eq!(cache.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_quota_recovered_by_evicting_old_value() {
        // 1 + 50 bytes stored; replacing with 60 bytes needs 112 > 100 while
        // the old value is still resident.
        let store = Arc::new(MemoryStore::with_quota(100));
        let (cache, events) = cache_with(store.clone());
        let log = record_events(&events);

        cache.set("k", &"a".repeat(50)).unwrap();
        let latest = "b".repeat(60);
        cache.set("k", &latest).unwrap();

        assert_eq!(cache.get("k"), Some(latest));
        assert_eq!(
            log.events(),
            vec![SyncEvent::LocalWriteRecovered {
                key: "k".to_string()
            }]
        );
    }

    #[test]
    fn test_quota_failure_after_retry_is_reported() {
        let (cache, events) = cache_with(Arc::new(MemoryStore::with_quota(10)));
        let log = record_events(&events);

        let err = cache.set("k", &"x".repeat(64)).unwrap_err();

        assert!(err.is_quota_exceeded());
        assert!(cache.get("k").is_none());
        assert_eq!(log.events()[0].event_type(), "LocalWriteFailed");
    }

    #[test]
    fn test_non_quota_error_is_not_retried() {
        let store = Arc::new(FailingStore::unavailable());
        let (cache, _) = cache_with(store.clone());

        let err = cache.set("k", "v").unwrap_err();

        assert!(matches!(err, SiteSyncError::StorageUnavailable(_)));
        assert_eq!(store.set_attempts(), 1);
    }

    #[test]
    fn test_get_and_remove_swallow_errors() {
        let (cache, _) = cache_with(Arc::new(FailingStore::unavailable()));
        assert!(cache.get("k").is_none());
        cache.remove("k");
        assert!(cache.keys().is_empty());
    }

    #[test]
    fn test_clear_except_preserves_listed_keys() {
        let (cache, _) = cache_with(Arc::new(MemoryStore::new()));
        cache.set(CONTENT_KEY, "{}").unwrap();
        cache.set(REMOTE_BACKUP_KEY, "{}").unwrap();
        cache.set("theme", "dark").unwrap();
        cache.set("draft-banner", "x").unwrap();

        let report = cache.clear_except(&[CONTENT_KEY, REMOTE_BACKUP_KEY]);

        assert_eq!(report, ClearReport { removed: 2, preserved: 2 });
        let mut keys = cache.keys();
        keys.sort();
        assert_eq!(keys, vec![REMOTE_BACKUP_KEY, CONTENT_KEY]);
    }

    #[test]
    fn test_malformed_json_reads_as_none() {
        let (cache, _) = cache_with(Arc::new(MemoryStore::new()));
        cache.set("k", "{not json").unwrap();
        let value: Option<serde_json::Value> = cache.get_json("k");
        assert!(value.is_none());
    }
}
