//! Composition root.
//!
//! [`SiteSyncBuilder`] wires the cache, remote clients, background
//! writer, storage strategy and store together. Every collaborator is
//! constructed here once and shared through `Arc`s; nothing in the crate
//! is a global.
//!
//! # Example
//!
//! ```ignore
//! use sitesync_core::app::SiteSyncBuilder;
//! use sitesync_core::config::SiteSyncConfig;
//!
//! let config = SiteSyncConfig::load()?;
//! let sync = SiteSyncBuilder::from_config(&config)?.build();
//! sync.hydrate().await;
//! sync.store().dispatch(command).await?;
//! sync.flush().await;
//! ```

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::cache::{KeyValueStore, LocalCache, MemoryStore};
use crate::command::Command;
use crate::config::{RemoteConfig, SiteSyncConfig};
use crate::error::{Result, SiteSyncError};
use crate::events::EventRegistry;
use crate::migration::migrate_content;
use crate::mobile::{HeadlessHost, MobileReconciler, PlatformHost, RefreshReport};
use crate::platform::{Classifier, PlatformClass, PlatformSignal, StaticSignal, classifier_for, classify};
use crate::remote::{RemoteConnector, RemoteStoreClient, RemoteTable};
use crate::server_path::{ContentEndpoint, SaveOutcome, ServerPersistence};
use crate::storage::PlatformStorage;
use crate::store::{DispatchReport, HydrateReport, SiteStore};
use crate::worker::{BackgroundWriter, DEFAULT_QUEUE_CAPACITY, WriteTargets};

enum RemoteSource {
    Offline,
    Table(Arc<dyn RemoteTable>),
    Connector(RemoteConnector),
}

/// Builder for a [`SiteSync`] instance.
///
/// Anything not set falls back to an offline default: a memory cache, no
/// remote store, no backend, a headless host and the default mobile
/// markers.
pub struct SiteSyncBuilder {
    store: Option<Arc<dyn KeyValueStore>>,
    remote: RemoteSource,
    endpoint: Option<Arc<dyn ContentEndpoint>>,
    host: Option<Arc<dyn PlatformHost>>,
    signal: Option<Arc<dyn PlatformSignal>>,
    classifier: Option<Classifier>,
    queue_capacity: usize,
    events: Option<Arc<EventRegistry>>,
}

impl Default for SiteSyncBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteSyncBuilder {
    /// Create a builder with offline defaults.
    pub fn new() -> Self {
        Self {
            store: None,
            remote: RemoteSource::Offline,
            endpoint: None,
            host: None,
            signal: None,
            classifier: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            events: None,
        }
    }

    /// Set the local key/value backend.
    pub fn with_key_value_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use an already connected remote table.
    pub fn with_remote_table(mut self, table: Arc<dyn RemoteTable>) -> Self {
        self.remote = RemoteSource::Table(table);
        self
    }

    /// Connect to the remote table lazily on first use.
    pub fn with_remote_connector(mut self, connector: RemoteConnector) -> Self {
        self.remote = RemoteSource::Connector(connector);
        self
    }

    /// Set the backend for the alternate persistence path.
    pub fn with_content_endpoint(mut self, endpoint: Arc<dyn ContentEndpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Set the host a forced refresh acts on.
    pub fn with_host(mut self, host: Arc<dyn PlatformHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Set the source of the client's capability string.
    pub fn with_signal(mut self, signal: Arc<dyn PlatformSignal>) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Replace the platform classification function.
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Set how many remote writes may wait in the queue.
    ///
    /// Default: 32
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Share an existing event registry.
    pub fn with_events(mut self, events: Arc<EventRegistry>) -> Self {
        self.events = Some(events);
        self
    }

    /// Create a builder from configuration.
    ///
    /// Opens the SQLite cache when built with the `sqlite` feature. The
    /// remote connection is deferred until first use.
    pub fn from_config(config: &SiteSyncConfig) -> Result<Self> {
        let mut builder = Self::new()
            .with_key_value_store(open_cache(config)?)
            .with_signal(Arc::new(StaticSignal::new(
                config.platform.capabilities.clone().unwrap_or_default(),
            )))
            .with_classifier(classifier_for(config.platform.mobile_markers.clone()))
            .queue_capacity(config.worker.queue_capacity);

        if config.remote.is_configured() {
            let remote = config.remote.clone();
            let timeout = config.network.timeout();
            builder = builder.with_remote_connector(Box::new(move || connect(&remote, timeout)));
        }

        if let Some(url) = &config.server.url {
            builder = builder.with_content_endpoint(open_endpoint(url, config)?);
        }

        let site_url = match &config.platform.site_url {
            Some(url) => Some(Url::parse(url).map_err(|_| SiteSyncError::InvalidUrl(url.clone()))?),
            None => None,
        };
        Ok(builder.with_host(Arc::new(HeadlessHost::new(site_url))))
    }

    /// Wire everything together and start the background writer.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> SiteSync {
        let events = self.events.unwrap_or_default();
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let cache = LocalCache::new(store, Arc::clone(&events));

        let remote = Arc::new(match self.remote {
            RemoteSource::Offline => RemoteStoreClient::offline(cache.clone()),
            RemoteSource::Table(table) => RemoteStoreClient::with_table(table, cache.clone()),
            RemoteSource::Connector(connector) => RemoteStoreClient::new(connector, cache.clone()),
        });

        let host = self
            .host
            .unwrap_or_else(|| Arc::new(HeadlessHost::default()));
        let mobile = Arc::new(MobileReconciler::new(Arc::clone(&remote), cache.clone(), host));

        let server = Arc::new(match self.endpoint {
            Some(endpoint) => ServerPersistence::new(endpoint, cache.clone()),
            None => ServerPersistence::offline(cache.clone()),
        });

        let writer = BackgroundWriter::spawn(
            WriteTargets {
                remote: Arc::clone(&remote),
                mobile: Arc::clone(&mobile),
            },
            self.queue_capacity,
            Arc::clone(&events),
        );

        let signal = self
            .signal
            .unwrap_or_else(|| Arc::new(StaticSignal::default()));
        let classifier: Classifier = self.classifier.unwrap_or_else(|| Arc::new(classify));
        let storage = Arc::new(
            PlatformStorage::new(
                cache.clone(),
                Arc::clone(&remote),
                Arc::clone(&mobile),
                writer.clone(),
                signal,
            )
            .with_classifier(classifier),
        );

        let store = Arc::new(SiteStore::new(storage.clone(), Arc::clone(&events)));

        SiteSync {
            events,
            cache,
            remote,
            mobile,
            server,
            writer,
            storage,
            store,
        }
    }
}

#[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
fn open_cache(config: &SiteSyncConfig) -> Result<Arc<dyn KeyValueStore>> {
    use crate::cache::SqliteStore;

    let Some(path) = config
        .cache
        .path
        .clone()
        .or_else(SiteSyncConfig::default_cache_path)
    else {
        log::warn!("[app] No data directory, using an in-memory cache");
        return Ok(Arc::new(MemoryStore::new()));
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let store = SqliteStore::open(&path)?;
    let store = match config.cache.page_limit {
        Some(pages) => store.with_page_limit(pages)?,
        None => store,
    };
    log::debug!("[app] Local cache at {}", path.display());
    Ok(Arc::new(store))
}

#[cfg(not(all(not(target_arch = "wasm32"), feature = "sqlite")))]
fn open_cache(_config: &SiteSyncConfig) -> Result<Arc<dyn KeyValueStore>> {
    log::info!("[app] Built without sqlite support, using an in-memory cache");
    Ok(Arc::new(MemoryStore::new()))
}

/// Build the remote table named by `remote`.
fn connect(remote: &RemoteConfig, timeout: std::time::Duration) -> Result<Arc<dyn RemoteTable>> {
    if let (Some(url), Some(api_key)) = (&remote.url, &remote.api_key) {
        #[cfg(all(not(target_arch = "wasm32"), feature = "http"))]
        {
            let table = crate::remote::PostgrestTable::new(url, &remote.table, api_key, timeout)?;
            return Ok(Arc::new(table));
        }
        #[cfg(not(all(not(target_arch = "wasm32"), feature = "http")))]
        {
            let _ = (api_key, timeout);
            return Err(SiteSyncError::RemoteUnavailable(format!(
                "cannot reach {}: built without http support",
                url
            )));
        }
    }

    if let Some(path) = &remote.sqlite_path {
        #[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
        {
            return Ok(Arc::new(crate::remote::SqliteTable::open(path)?));
        }
        #[cfg(not(all(not(target_arch = "wasm32"), feature = "sqlite")))]
        {
            return Err(SiteSyncError::RemoteUnavailable(format!(
                "cannot open {}: built without sqlite support",
                path.display()
            )));
        }
    }

    Err(SiteSyncError::RemoteUnavailable(
        "missing remote credentials".to_string(),
    ))
}

#[cfg(all(not(target_arch = "wasm32"), feature = "http"))]
fn open_endpoint(url: &str, config: &SiteSyncConfig) -> Result<Arc<dyn ContentEndpoint>> {
    let endpoint = crate::server_path::HttpContentEndpoint::new(url, config.network.timeout())?;
    Ok(Arc::new(endpoint))
}

#[cfg(not(all(not(target_arch = "wasm32"), feature = "http")))]
fn open_endpoint(url: &str, _config: &SiteSyncConfig) -> Result<Arc<dyn ContentEndpoint>> {
    Err(SiteSyncError::RemoteUnavailable(format!(
        "cannot reach {}: built without http support",
        url
    )))
}

/// A running sitesync instance.
pub struct SiteSync {
    events: Arc<EventRegistry>,
    cache: LocalCache,
    remote: Arc<RemoteStoreClient>,
    mobile: Arc<MobileReconciler>,
    server: Arc<ServerPersistence>,
    writer: BackgroundWriter,
    storage: Arc<PlatformStorage>,
    store: Arc<SiteStore>,
}

impl SiteSync {
    pub fn events(&self) -> &Arc<EventRegistry> {
        &self.events
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn remote(&self) -> &Arc<RemoteStoreClient> {
        &self.remote
    }

    pub fn mobile(&self) -> &Arc<MobileReconciler> {
        &self.mobile
    }

    pub fn server(&self) -> &Arc<ServerPersistence> {
        &self.server
    }

    pub fn store(&self) -> &Arc<SiteStore> {
        &self.store
    }

    /// Platform class the storage strategy currently applies.
    pub fn platform(&self) -> PlatformClass {
        self.storage.platform()
    }

    /// Load the store from storage.
    pub async fn hydrate(&self) -> HydrateReport {
        self.store.hydrate().await
    }

    /// Wait for queued remote writes to finish.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    /// Save the current content through the alternate backend.
    pub async fn push_to_server(&self) -> SaveOutcome {
        let content = self.store.content().to_value();
        self.server.save_content(&content).await
    }

    /// Replace the current content with what the alternate backend holds.
    ///
    /// Returns `Ok(None)` when the backend and its local copy are both empty.
    pub async fn pull_from_server(&self) -> Result<Option<DispatchReport>> {
        let Some(content) = self.server.load_content().await else {
            return Ok(None);
        };
        let outcome = migrate_content(&content);
        let report = self
            .store
            .dispatch(Command::ReplaceContent(Box::new(outcome.content)))
            .await?;
        Ok(Some(report))
    }

    /// Reset all content to the compiled default and persist it.
    pub async fn reset(&self) -> Result<DispatchReport> {
        self.store.dispatch(Command::ResetContent).await
    }

    /// Clear every cache layer except the content keys and reload.
    pub async fn force_refresh(&self) -> RefreshReport {
        self.mobile.force_complete_refresh().await
    }
}

impl fmt::Debug for SiteSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteSync")
            .field("platform", &self.platform())
            .field("remote", &self.remote)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}
