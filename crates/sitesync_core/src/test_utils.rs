//! Test utilities for sitesync_core
//!
//! Failing and gated collaborators shared across the unit test modules.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value as JsonValue;
use tokio::sync::Notify;
use url::Url;

use crate::BoxFuture;
use crate::cache::KeyValueStore;
use crate::error::{Result, SiteSyncError};
use crate::events::{EventRegistry, SyncEvent};
use crate::mobile::PlatformHost;
use crate::server_path::{
    ContentEndpoint, GetContentResponse, SaveContentRequest, SaveContentResponse,
};

/// A key/value store whose every operation fails.
#[derive(Default)]
pub struct FailingStore {
    set_attempts: AtomicUsize,
}

impl FailingStore {
    /// A store that reports itself unavailable.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// How many times `set` was called.
    pub fn set_attempts(&self) -> usize {
        self.set_attempts.load(Ordering::SeqCst)
    }

    fn error() -> SiteSyncError {
        SiteSyncError::StorageUnavailable("storage disabled".to_string())
    }
}

impl KeyValueStore for FailingStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(Self::error())
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        self.set_attempts.fetch_add(1, Ordering::SeqCst);
        Err(Self::error())
    }

    fn remove(&self, _key: &str) -> Result<()> {
        Err(Self::error())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Err(Self::error())
    }
}

/// Events captured from a registry.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<SyncEvent>>>,
}

impl EventLog {
    /// Everything captured so far.
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }
}

/// Capture every event emitted on `registry`.
pub fn record_events(registry: &Arc<EventRegistry>) -> EventLog {
    let log = EventLog::default();
    let sink = log.events.clone();
    registry.subscribe(Arc::new(move |event| {
        sink.lock().unwrap().push(event.clone());
    }));
    log
}

/// In-memory stand-in for the backend's content endpoints.
#[derive(Default)]
pub struct MemoryEndpoint {
    stored: Mutex<Option<(JsonValue, String)>>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every request fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Content of the last successful save.
    pub fn stored(&self) -> Option<JsonValue> {
        self.stored.lock().unwrap().as_ref().map(|(c, _)| c.clone())
    }
}

impl ContentEndpoint for MemoryEndpoint {
    fn save<'a>(
        &'a self,
        request: &'a SaveContentRequest,
    ) -> BoxFuture<'a, Result<SaveContentResponse>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(SiteSyncError::RemoteStatus {
                    status: 500,
                    message: "internal error".to_string(),
                });
            }
            *self.stored.lock().unwrap() = Some((request.content.clone(), request.timestamp.clone()));
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(SaveContentResponse {
                success: true,
                message: "Content saved".to_string(),
                timestamp: request.timestamp.clone(),
            })
        })
    }

    fn get(&self) -> BoxFuture<'_, Result<Option<GetContentResponse>>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(SiteSyncError::RemoteUnavailable("connection refused".to_string()));
            }
            let stored = self.stored.lock().unwrap().clone();
            Ok(stored.map(|(content, timestamp)| GetContentResponse {
                success: true,
                content,
                last_updated: timestamp,
                version: self.saves.load(Ordering::SeqCst) as u64,
            }))
        })
    }
}

/// Endpoint whose saves block until released, for in-flight tests.
#[derive(Default)]
pub struct GatedEndpoint {
    inner: MemoryEndpoint,
    entered: Notify,
    gate: Notify,
}

impl GatedEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until a save is blocked at the gate.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let the blocked save continue.
    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn inner(&self) -> &MemoryEndpoint {
        &self.inner
    }
}

impl ContentEndpoint for GatedEndpoint {
    fn save<'a>(
        &'a self,
        request: &'a SaveContentRequest,
    ) -> BoxFuture<'a, Result<SaveContentResponse>> {
        Box::pin(async move {
            self.entered.notify_one();
            self.gate.notified().await;
            self.inner.save(request).await
        })
    }

    fn get(&self) -> BoxFuture<'_, Result<Option<GetContentResponse>>> {
        self.inner.get()
    }
}

/// Host whose worker and transport-cache steps fail.
pub struct RecordingHost {
    url: Url,
    fail_steps: bool,
    reloads: AtomicUsize,
}

impl RecordingHost {
    /// A host where unregistering workers and clearing caches both fail.
    pub fn failing() -> Self {
        Self {
            url: Url::parse("https://site.example/").unwrap(),
            fail_steps: true,
            reloads: AtomicUsize::new(0),
        }
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    fn step(&self, n: usize) -> Result<usize> {
        if self.fail_steps {
            Err(SiteSyncError::StorageUnavailable("not permitted".to_string()))
        } else {
            Ok(n)
        }
    }
}

impl PlatformHost for RecordingHost {
    fn unregister_workers(&self) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move { self.step(1) })
    }

    fn clear_transport_caches(&self) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move { self.step(2) })
    }

    fn current_url(&self) -> Option<Url> {
        Some(self.url.clone())
    }

    fn reload(&self, _url: &Url) -> Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
