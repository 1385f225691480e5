//! Platform-aware state storage.
//!
//! [`StateStorage`] is the only persistence contract the store knows
//! about. [`PlatformStorage`] implements it by classifying the client on
//! every call and routing reads and writes through the standard remote
//! client or the cache-distrusting mobile path, with the local cache as
//! the synchronous source of truth for writes and the fallback for reads.

use std::fmt;
use std::sync::Arc;

use serde_json::{Value as JsonValue, json};

use crate::BoxFuture;
use crate::cache::LocalCache;
use crate::error::Result;
use crate::mobile::MobileReconciler;
use crate::model::REMOTE_ORIGIN_VERSION;
use crate::platform::{Classifier, PlatformClass, PlatformSignal, classify};
use crate::remote::{LoadSource, RemoteStoreClient};
use crate::worker::BackgroundWriter;

/// Key/value persistence used by the store.
pub trait StateStorage: Send + Sync {
    /// Read the serialized envelope at `key`.
    fn get_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>>;

    /// Write the serialized envelope at `key`.
    ///
    /// Returns once the value is durable locally. An error means the local
    /// write failed; remote propagation happens later and never errors here.
    fn set_item<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<()>>;

    /// Remove `key` locally.
    fn remove_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()>;
}

/// Storage that only touches the local cache.
#[derive(Debug, Clone)]
pub struct LocalOnlyStorage {
    cache: LocalCache,
}

impl LocalOnlyStorage {
    pub fn new(cache: LocalCache) -> Self {
        Self { cache }
    }
}

impl StateStorage for LocalOnlyStorage {
    fn get_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move { self.cache.get(key) })
    }

    fn set_item<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.cache.set(key, &value) })
    }

    fn remove_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move { self.cache.remove(key) })
    }
}

/// Storage strategy that picks the remote path by platform class.
pub struct PlatformStorage {
    cache: LocalCache,
    remote: Arc<RemoteStoreClient>,
    mobile: Arc<MobileReconciler>,
    writer: BackgroundWriter,
    signal: Arc<dyn PlatformSignal>,
    classifier: Classifier,
}

impl PlatformStorage {
    /// Create a strategy using the default mobile markers.
    pub fn new(
        cache: LocalCache,
        remote: Arc<RemoteStoreClient>,
        mobile: Arc<MobileReconciler>,
        writer: BackgroundWriter,
        signal: Arc<dyn PlatformSignal>,
    ) -> Self {
        Self {
            cache,
            remote,
            mobile,
            writer,
            signal,
            classifier: Arc::new(classify),
        }
    }

    /// Replace the classification function.
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Classify the client as it is right now.
    pub fn platform(&self) -> PlatformClass {
        (self.classifier)(&self.signal.capabilities())
    }

    /// Wrap remote content in an envelope, keeping the local session.
    ///
    /// Content without a recorded version is stamped
    /// [`REMOTE_ORIGIN_VERSION`] so the store migrates it.
    fn envelope_from_remote(
        &self,
        key: &str,
        content: JsonValue,
        version: Option<u32>,
    ) -> Option<String> {
        let user = self
            .cache
            .get_json::<JsonValue>(key)
            .and_then(|local| local.get("state")?.get("user").cloned())
            .unwrap_or_else(|| json!({ "authenticated": false }));

        let envelope = json!({
            "state": { "content": content, "user": user },
            "version": version.unwrap_or(REMOTE_ORIGIN_VERSION),
        });

        let raw = envelope.to_string();
        if let Err(e) = self.cache.set(key, &raw) {
            log::warn!("[storage] Could not mirror remote content locally: {}", e);
        }
        Some(raw)
    }

    async fn get(&self, key: &str) -> Option<String> {
        let platform = self.platform();
        log::debug!("[storage] get '{}' on {} platform", key, platform);

        let loaded = match platform {
            PlatformClass::Standard => self.remote.load().await,
            PlatformClass::MobileAggressive => self.mobile.load_reconciled().await,
        };

        match loaded {
            Some(loaded) if loaded.source == LoadSource::Remote => {
                self.envelope_from_remote(key, loaded.data, loaded.version)
            }
            Some(loaded) if loaded.source == LoadSource::PendingBackup => {
                // The local cache already holds that write with its session
                match self.cache.get(key) {
                    Some(local) => Some(local),
                    None => self.envelope_from_remote(key, loaded.data, loaded.version),
                }
            }
            _ => self.cache.get(key),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.cache.set(key, &value)?;

        let Some((content, version)) = split_envelope(&value) else {
            log::debug!("[storage] '{}' holds no site content, not syncing", key);
            return Ok(());
        };

        // Reads before the queue drains must find this write
        let staged = self.remote.stage(&content, version);
        self.writer.enqueue(self.platform(), staged).await;
        Ok(())
    }
}

/// Content and schema version of a serialized envelope.
fn split_envelope(raw: &str) -> Option<(JsonValue, Option<u32>)> {
    let mut envelope: JsonValue = serde_json::from_str(raw).ok()?;
    let version = envelope
        .get("version")
        .and_then(JsonValue::as_u64)
        .and_then(|v| u32::try_from(v).ok());
    let content = envelope.get_mut("state")?.get_mut("content")?.take();
    Some((content, version))
}

impl StateStorage for PlatformStorage {
    fn get_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(self.get(key))
    }

    fn set_item<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.set(key, value))
    }

    fn remove_item<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move { self.cache.remove(key) })
    }
}

impl fmt::Debug for PlatformStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformStorage")
            .field("platform", &self.platform())
            .finish_non_exhaustive()
    }
}
