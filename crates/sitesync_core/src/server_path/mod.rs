//! Alternate persistence through the site's own backend.
//!
//! This path is independent of the [`remote`](crate::remote) store: both
//! may hold different content and nothing reconciles them. Callers pick
//! one per operation.

#[cfg(all(not(target_arch = "wasm32"), feature = "http"))]
mod http;

#[cfg(all(not(target_arch = "wasm32"), feature = "http"))]
pub use http::HttpContentEndpoint;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::BoxFuture;
use crate::cache::{LocalCache, SERVER_BACKUP_KEY};
use crate::error::{Result, SiteSyncError};
use crate::events::SyncEvent;

/// Body of `POST /api/save-content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveContentRequest {
    pub content: JsonValue,
    pub timestamp: String,
}

/// Response of `POST /api/save-content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveContentResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: String,
}

/// Response of `GET /api/get-content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetContentResponse {
    pub success: bool,
    pub content: JsonValue,
    pub last_updated: String,
    /// Number of saves the backend has accepted.
    pub version: u64,
}

/// Fallback copy written when the backend rejects or misses a save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerBackupRecord {
    pub content: JsonValue,
    pub timestamp: String,
}

/// The backend's content endpoints.
pub trait ContentEndpoint: Send + Sync {
    /// Store `request.content` as the site's content.
    fn save<'a>(&'a self, request: &'a SaveContentRequest)
    -> BoxFuture<'a, Result<SaveContentResponse>>;

    /// Fetch the stored content, or `None` if nothing was ever saved.
    fn get(&self) -> BoxFuture<'_, Result<Option<GetContentResponse>>>;
}

/// Outcome of [`ServerPersistence::save_content`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The backend stored the content.
    Saved { timestamp: String },
    /// The backend failed; the content went to the server backup key.
    SavedLocally { timestamp: String },
    /// Another save was in flight, so this one did nothing.
    Skipped,
}

/// Resets the in-flight flag when dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Saves and loads content through a [`ContentEndpoint`], with a local
/// fallback and at most one save in flight.
pub struct ServerPersistence {
    endpoint: Option<Arc<dyn ContentEndpoint>>,
    cache: LocalCache,
    backup_key: String,
    in_flight: AtomicBool,
}

impl ServerPersistence {
    /// Create a persistence path over `endpoint`.
    pub fn new(endpoint: Arc<dyn ContentEndpoint>, cache: LocalCache) -> Self {
        Self {
            endpoint: Some(endpoint),
            cache,
            backup_key: SERVER_BACKUP_KEY.to_string(),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Create a persistence path with no backend; everything goes to the backup key.
    pub fn offline(cache: LocalCache) -> Self {
        Self {
            endpoint: None,
            cache,
            backup_key: SERVER_BACKUP_KEY.to_string(),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Use a different cache key for the fallback copy.
    pub fn with_backup_key(mut self, key: impl Into<String>) -> Self {
        self.backup_key = key.into();
        self
    }

    /// Whether a save is currently running.
    pub fn is_saving(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// The fallback copy, if one was written.
    pub fn backup(&self) -> Option<ServerBackupRecord> {
        self.cache.get_json(&self.backup_key)
    }

    /// Save content to the backend.
    ///
    /// Returns [`SaveOutcome::Skipped`] without doing anything if another
    /// save has not finished yet.
    pub async fn save_content(&self, content: &JsonValue) -> SaveOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            log::warn!("[server] Save already in progress, dropping this save");
            self.cache.events().emit(&SyncEvent::ServerSaveSkipped);
            return SaveOutcome::Skipped;
        };

        let request = SaveContentRequest {
            content: content.clone(),
            timestamp: Utc::now().to_rfc3339(),
        };

        match self.send(&request).await {
            Ok(response) => {
                log::info!("[server] Content saved at {}", response.timestamp);
                self.cache.events().emit(&SyncEvent::ServerSaveCompleted {
                    timestamp: response.timestamp.clone(),
                });
                SaveOutcome::Saved {
                    timestamp: response.timestamp,
                }
            }
            Err(e) => {
                log::warn!("[server] Save failed, keeping local copy: {}", e);
                let backup = ServerBackupRecord {
                    content: request.content,
                    timestamp: request.timestamp.clone(),
                };
                if let Err(e) = self.cache.set_json(&self.backup_key, &backup) {
                    log::error!("[server] Could not write local copy either: {}", e);
                }
                self.cache.events().emit(&SyncEvent::ServerSaveFallback {
                    error: e.to_string(),
                });
                SaveOutcome::SavedLocally {
                    timestamp: request.timestamp,
                }
            }
        }
    }

    async fn send(&self, request: &SaveContentRequest) -> Result<SaveContentResponse> {
        let Some(endpoint) = &self.endpoint else {
            return Err(SiteSyncError::RemoteUnavailable(
                "no backend configured".to_string(),
            ));
        };
        let response = endpoint.save(request).await?;
        if !response.success {
            return Err(SiteSyncError::RemoteUnavailable(response.message));
        }
        Ok(response)
    }

    /// Load content from the backend, falling back to the local copy.
    ///
    /// `None` means neither has anything; callers use the compiled default.
    pub async fn load_content(&self) -> Option<JsonValue> {
        if let Some(endpoint) = &self.endpoint {
            match endpoint.get().await {
                Ok(Some(response)) if response.success => return Some(response.content),
                Ok(Some(_)) => log::warn!("[server] Backend reported an unsuccessful load"),
                Ok(None) => log::info!("[server] Backend has no saved content"),
                Err(e) => log::warn!("[server] Load failed: {}", e),
            }
        }
        self.backup().map(|b| b.content)
    }
}

impl fmt::Debug for ServerPersistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerPersistence")
            .field("has_endpoint", &self.endpoint.is_some())
            .field("backup_key", &self.backup_key)
            .field("in_flight", &self.is_saving())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::events::EventRegistry;
    use crate::test_utils::{GatedEndpoint, MemoryEndpoint, record_events};
    use serde_json::json;

    fn memory_cache() -> LocalCache {
        LocalCache::new(Arc::new(MemoryStore::new()), Arc::new(EventRegistry::new()))
    }

    #[test]
    fn test_guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let _held = InFlightGuard::acquire(&flag).unwrap();
            assert!(InFlightGuard::acquire(&flag).is_none());
        }
        assert!(InFlightGuard::acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        let persistence = ServerPersistence::new(endpoint.clone(), memory_cache());

        let outcome = persistence.save_content(&json!({"hero": {"title": "a"}})).await;

        assert!(matches!(outcome, SaveOutcome::Saved { .. }));
        assert_eq!(endpoint.save_count(), 1);
        assert_eq!(
            persistence.load_content().await,
            Some(json!({"hero": {"title": "a"}}))
        );
        assert!(persistence.backup().is_none());
    }

    #[tokio::test]
    async fn test_failed_save_writes_local_copy() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        endpoint.set_failing(true);
        let cache = memory_cache();
        let log = record_events(cache.events());
        let persistence = ServerPersistence::new(endpoint, cache);

        let outcome = persistence.save_content(&json!({"v": 1})).await;

        assert!(matches!(outcome, SaveOutcome::SavedLocally { .. }));
        assert_eq!(persistence.backup().unwrap().content, json!({"v": 1}));
        assert_eq!(persistence.load_content().await, Some(json!({"v": 1})));
        assert_eq!(log.events()[0].event_type(), "ServerSaveFallback");
        assert!(!persistence.is_saving());
    }

    #[tokio::test]
    async fn test_load_with_nothing_saved() {
        let persistence = ServerPersistence::new(Arc::new(MemoryEndpoint::new()), memory_cache());
        assert_eq!(persistence.load_content().await, None);
    }

    #[tokio::test]
    async fn test_offline_uses_backup_key() {
        let persistence = ServerPersistence::offline(memory_cache());
        persistence.save_content(&json!({"v": 2})).await;
        assert_eq!(persistence.load_content().await, Some(json!({"v": 2})));
    }

    #[tokio::test]
    async fn test_concurrent_save_is_dropped() {
        let endpoint = Arc::new(GatedEndpoint::new());
        let cache = memory_cache();
        let log = record_events(cache.events());
        let persistence = Arc::new(ServerPersistence::new(endpoint.clone(), cache));

        let first = {
            let persistence = persistence.clone();
            tokio::spawn(async move { persistence.save_content(&json!({"v": "first"})).await })
        };
        endpoint.wait_entered().await;

        let second = persistence.save_content(&json!({"v": "second"})).await;
        assert_eq!(second, SaveOutcome::Skipped);

        endpoint.release();
        let first = first.await.unwrap();

        assert!(matches!(first, SaveOutcome::Saved { .. }));
        assert_eq!(endpoint.inner().save_count(), 1);
        assert_eq!(endpoint.inner().stored(), Some(json!({"v": "first"})));
        assert!(log.events().contains(&SyncEvent::ServerSaveSkipped));
    }
}
