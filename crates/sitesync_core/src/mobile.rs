//! Cache-distrusting remote access for mobile clients.
//!
//! Some mobile platforms serve stale responses from intermediate caches
//! even when the app's own cache is correct. On those clients every
//! remote request goes out with [`CachePolicy::Bypass`], and the operator
//! has a [`MobileReconciler::force_complete_refresh`] escape hatch that
//! wipes everything but the content keys and reloads.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value as JsonValue;
use url::Url;

use crate::BoxFuture;
use crate::cache::{ClearReport, CONTENT_KEY, LocalCache, REMOTE_BACKUP_KEY, SERVER_BACKUP_KEY};
use crate::error::Result;
use crate::events::SyncEvent;
use crate::model::CURRENT_VERSION;
use crate::remote::{
    CachePolicy, LoadedContent, LocalBackupRecord, RemoteStoreClient, RemoteWriteStatus,
    cache_busted,
};

/// Query parameter appended to the reload URL.
pub const REFRESH_PARAM: &str = "_refresh";

/// The client environment a refresh acts on.
///
/// In a browser this maps to service worker registrations, the Cache
/// Storage API and `location.replace`.
pub trait PlatformHost: Send + Sync {
    /// Unregister background worker registrations. Returns how many were removed.
    fn unregister_workers(&self) -> BoxFuture<'_, Result<usize>>;

    /// Drop transport-level response caches. Returns how many were cleared.
    fn clear_transport_caches(&self) -> BoxFuture<'_, Result<usize>>;

    /// URL the client is showing, if it has one.
    fn current_url(&self) -> Option<Url>;

    /// Replace the client with a fresh load of `url`.
    fn reload(&self, url: &Url) -> Result<()>;
}

/// What [`MobileReconciler::force_complete_refresh`] did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshReport {
    pub workers_unregistered: usize,
    pub transport_caches_cleared: usize,
    pub cache: ClearReport,
    /// URL handed to [`PlatformHost::reload`], if the reload was requested.
    pub reload_url: Option<String>,
    /// Steps that failed, in order. The remaining steps still ran.
    pub failures: Vec<String>,
}

impl RefreshReport {
    /// Whether every step succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.reload_url.is_some()
    }
}

/// Host for processes without a UI.
///
/// There are no workers or transport caches to clear; reloads are
/// logged and recorded.
#[derive(Debug, Default)]
pub struct HeadlessHost {
    url: Option<Url>,
    reloads: Mutex<Vec<Url>>,
}

impl HeadlessHost {
    /// Create a host showing `url`.
    pub fn new(url: Option<Url>) -> Self {
        Self {
            url,
            reloads: Mutex::new(Vec::new()),
        }
    }

    /// Every URL passed to `reload`.
    pub fn reloads(&self) -> Vec<Url> {
        self.reloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PlatformHost for HeadlessHost {
    fn unregister_workers(&self) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async { Ok(0) })
    }

    fn clear_transport_caches(&self) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async { Ok(0) })
    }

    fn current_url(&self) -> Option<Url> {
        self.url.clone()
    }

    fn reload(&self, url: &Url) -> Result<()> {
        log::info!("[mobile] Reload requested: {}", url);
        self.reloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.clone());
        Ok(())
    }
}

/// Direct, uncached remote access plus the forced refresh.
///
/// Shares the connection of the [`RemoteStoreClient`] it is built from.
pub struct MobileReconciler {
    remote: Arc<RemoteStoreClient>,
    cache: LocalCache,
    host: Arc<dyn PlatformHost>,
    preserve: Vec<String>,
}

impl MobileReconciler {
    /// Create a reconciler. The preserve list holds the three content keys.
    pub fn new(remote: Arc<RemoteStoreClient>, cache: LocalCache, host: Arc<dyn PlatformHost>) -> Self {
        Self {
            remote,
            cache,
            host,
            preserve: vec![
                CONTENT_KEY.to_string(),
                REMOTE_BACKUP_KEY.to_string(),
                SERVER_BACKUP_KEY.to_string(),
            ],
        }
    }

    /// Replace the keys a forced refresh never clears.
    pub fn with_preserve_list(mut self, keys: Vec<String>) -> Self {
        self.preserve = keys;
        self
    }

    /// Keys a forced refresh never clears.
    pub fn preserve_list(&self) -> &[String] {
        &self.preserve
    }

    /// Read the remote record, bypassing every cache.
    ///
    /// `None` on any failure or when the record does not exist.
    pub async fn load_direct_from_remote(&self) -> Option<JsonValue> {
        let table = self.remote.initialize().await?;
        match table.select(self.remote.record_id(), CachePolicy::Bypass).await {
            Ok(Some(record)) => Some(record.data),
            Ok(None) => {
                log::info!("[mobile] No remote record yet");
                None
            }
            Err(e) => {
                log::warn!("[mobile] Direct load failed: {}", e);
                None
            }
        }
    }

    /// Load content for the editor, bypassing every cache.
    ///
    /// Same precedence as [`RemoteStoreClient::load`]: a pending local
    /// backup at least as new as the remote record wins over it.
    pub async fn load_reconciled(&self) -> Option<LoadedContent> {
        self.remote.load_with(CachePolicy::Bypass).await
    }

    /// Write the remote record, bypassing every cache. Returns whether it worked.
    ///
    /// The content is backed up locally as a pending write first.
    pub async fn save_direct_to_remote(&self, content: &JsonValue) -> bool {
        let staged = self.remote.stage(content, Some(CURRENT_VERSION));
        self.upload_direct(&staged).await
    }

    /// Upsert an already staged write, bypassing every cache.
    pub async fn upload_direct(&self, staged: &LocalBackupRecord) -> bool {
        match self.remote.upload(staged, CachePolicy::Bypass).await {
            RemoteWriteStatus::Synced => true,
            RemoteWriteStatus::BackedUpLocally { reason } => {
                log::warn!("[mobile] Direct save failed: {}", reason);
                false
            }
        }
    }

    /// Clear every cache layer except the preserved content keys, then reload.
    ///
    /// Destructive. Only for an explicit user or operator request.
    pub async fn force_complete_refresh(&self) -> RefreshReport {
        log::warn!("[mobile] Forcing a complete refresh");
        let mut report = RefreshReport::default();

        match self.host.unregister_workers().await {
            Ok(n) => report.workers_unregistered = n,
            Err(e) => {
                log::warn!("[mobile] Could not unregister workers: {}", e);
                report.failures.push(format!("unregister workers: {}", e));
            }
        }

        match self.host.clear_transport_caches().await {
            Ok(n) => report.transport_caches_cleared = n,
            Err(e) => {
                log::warn!("[mobile] Could not clear transport caches: {}", e);
                report.failures.push(format!("clear transport caches: {}", e));
            }
        }

        let preserve: Vec<&str> = self.preserve.iter().map(String::as_str).collect();
        report.cache = self.cache.clear_except(&preserve);
        self.cache.events().emit(&SyncEvent::CacheCleared {
            removed: report.cache.removed,
            preserved: report.cache.preserved,
        });

        let Some(url) = self.host.current_url() else {
            log::warn!("[mobile] No current URL to reload");
            report.failures.push("reload: no current url".to_string());
            return report;
        };
        let url = cache_busted(&url, REFRESH_PARAM);
        self.cache.events().emit(&SyncEvent::RefreshRequested {
            url: url.to_string(),
        });
        match self.host.reload(&url) {
            Ok(()) => report.reload_url = Some(url.to_string()),
            Err(e) => {
                log::warn!("[mobile] Reload failed: {}", e);
                report.failures.push(format!("reload: {}", e));
            }
        }

        report
    }
}

impl fmt::Debug for MobileReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MobileReconciler")
            .field("preserve", &self.preserve)
            .finish_non_exhaustive()
    }
}
