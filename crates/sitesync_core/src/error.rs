use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Unified error type for sitesync operations
#[derive(Debug, Error)]
pub enum SiteSyncError {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Local cache errors
    #[error("Storage quota exceeded while writing '{key}' ({bytes} bytes)")]
    QuotaExceeded { key: String, bytes: usize },

    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    #[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // Remote errors
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Remote responded with status {status}: {message}")]
    RemoteStatus { status: u16, message: String },

    #[cfg(all(not(target_arch = "wasm32"), feature = "http"))]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),

    // Command errors
    #[error("Apartment '{0}' not found")]
    ApartmentNotFound(String),

    #[error("Apartment '{0}' already exists")]
    DuplicateApartment(String),

    #[error("Review '{0}' not found")]
    ReviewNotFound(String),

    #[error("Promotion '{0}' not found")]
    PromotionNotFound(String),

    // Config errors
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Result type alias for sitesync operations
pub type Result<T> = std::result::Result<T, SiteSyncError>;

impl SiteSyncError {
    /// Whether this error means the local cache ran out of space.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, SiteSyncError::QuotaExceeded { .. })
    }

    /// Convert to a serializable representation for IPC
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }
}

/// A serializable representation of SiteSyncError for IPC (e.g., the editor frontend)
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Cache key involved (if applicable)
    pub key: Option<String>,
}

impl From<&SiteSyncError> for SerializableError {
    fn from(err: &SiteSyncError) -> Self {
        let kind = match err {
            SiteSyncError::Io(_) => "Io",
            SiteSyncError::FileRead { .. } => "FileRead",
            SiteSyncError::Json(_) => "Json",
            SiteSyncError::QuotaExceeded { .. } => "QuotaExceeded",
            SiteSyncError::StorageUnavailable(_) => "StorageUnavailable",
            #[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
            SiteSyncError::Sqlite(_) => "Sqlite",
            SiteSyncError::RemoteUnavailable(_) => "RemoteUnavailable",
            SiteSyncError::RemoteStatus { .. } => "RemoteStatus",
            #[cfg(all(not(target_arch = "wasm32"), feature = "http"))]
            SiteSyncError::Http(_) => "Http",
            SiteSyncError::InvalidUrl(_) => "InvalidUrl",
            SiteSyncError::ApartmentNotFound(_) => "ApartmentNotFound",
            SiteSyncError::DuplicateApartment(_) => "DuplicateApartment",
            SiteSyncError::ReviewNotFound(_) => "ReviewNotFound",
            SiteSyncError::PromotionNotFound(_) => "PromotionNotFound",
            SiteSyncError::ConfigParse(_) => "ConfigParse",
            SiteSyncError::ConfigSerialize(_) => "ConfigSerialize",
            SiteSyncError::NoConfigDir => "NoConfigDir",
        }
        .to_string();

        let key = match err {
            SiteSyncError::QuotaExceeded { key, .. } => Some(key.clone()),
            _ => None,
        };

        Self {
            kind,
            message: err.to_string(),
            key,
        }
    }
}

impl From<SiteSyncError> for SerializableError {
    fn from(err: SiteSyncError) -> Self {
        SerializableError::from(&err)
    }
}
