//! Configuration types for sitesync.
//!
//! [`SiteSyncConfig`] is persisted as TOML (typically at
//! `~/.config/sitesync/config.toml` on Unix systems). Every section and
//! field has a default, so an empty file is a valid configuration that
//! runs fully offline against a local cache.
//!
//! # Example
//!
//! ```toml
//! [remote]
//! url = "https://project.example.co"
//! api_key = "anon-key"
//!
//! [server]
//! url = "http://localhost:3030"
//!
//! [platform]
//! capabilities = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteSyncError};
use crate::platform::DEFAULT_MOBILE_MARKERS;
use crate::worker::DEFAULT_QUEUE_CAPACITY;

/// User-editable settings for every component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSyncConfig {
    pub remote: RemoteConfig,
    pub server: ServerEndpointConfig,
    pub cache: CacheConfig,
    pub worker: WorkerConfig,
    pub network: NetworkConfig,
    pub platform: PlatformConfig,
}

/// Managed remote store credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// PostgREST project URL (e.g., "https://project.example.co")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// API key sent as `apikey` and bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Table holding the content row
    pub table: String,

    /// SQLite file to use as the remote store when no URL is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<PathBuf>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            table: "site_content".to_string(),
            sqlite_path: None,
        }
    }
}

impl RemoteConfig {
    /// Whether any remote backend is configured.
    pub fn is_configured(&self) -> bool {
        (self.url.is_some() && self.api_key.is_some()) || self.sqlite_path.is_some()
    }
}

/// The site's own backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEndpointConfig {
    /// Base URL of the backend (e.g., "http://localhost:3030")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Local cache location and limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// SQLite file for the local cache. Defaults to the user data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Page budget emulating a storage quota
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_limit: Option<u32>,
}

/// Background writer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Remote writes that may wait before `set_item` blocks
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Client platform detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Fixed capability string; overridden by `SITESYNC_PLATFORM` in the CLI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<String>,

    /// Substrings marking a capability string as mobile
    pub mobile_markers: Vec<String>,

    /// Page reloaded by a forced refresh
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            capabilities: None,
            mobile_markers: DEFAULT_MOBILE_MARKERS.iter().map(|m| m.to_string()).collect(),
            site_url: None,
        }
    }
}

impl SiteSyncConfig {
    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| SiteSyncError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: SiteSyncConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl SiteSyncConfig {
    /// Get the config file path (~/.config/sitesync/config.toml)
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sitesync").join("config.toml"))
    }

    /// Default local cache file (~/.local/share/sitesync/cache.db)
    pub fn default_cache_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("sitesync").join("cache.db"))
    }

    /// Load config from default location, or return default if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            return Self::load_from(&path);
        }

        Ok(SiteSyncConfig::default())
    }

    /// Save config to default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or(SiteSyncError::NoConfigDir)?;
        self.save_to(&path)
    }
}
