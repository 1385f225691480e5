//! Events emitted by the persistence layer.
//!
//! Background writes, fallbacks and migrations never surface errors to the
//! editor. Instead they are reported here so operators and tests can
//! observe what happened.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::platform::PlatformClass;

/// Events emitted by cache, remote and store operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "type")]
pub enum SyncEvent {
    // === Local cache ===
    /// A quota error was recovered by evicting the old value and retrying.
    LocalWriteRecovered {
        /// Cache key that was rewritten.
        key: String,
    },

    /// A local write failed even after the evict-and-retry.
    LocalWriteFailed {
        /// Cache key that could not be written.
        key: String,
        /// Error message from the storage backend.
        error: String,
    },

    // === Remote writes ===
    /// A remote write was handed to the background writer.
    RemoteSaveQueued {
        /// Which path will perform the write.
        platform: PlatformClass,
    },

    /// A background remote write reached the remote store.
    RemoteSaveCompleted {
        /// Which path performed the write.
        platform: PlatformClass,
    },

    /// A background remote write failed; the local backup still holds the data.
    RemoteSaveFailed {
        /// Which path attempted the write.
        platform: PlatformClass,
        /// Error message.
        error: String,
    },

    // === Remote reads ===
    /// A remote read failed or was empty and a local copy was used instead.
    RemoteLoadFallback {
        /// Why the remote result was not used.
        reason: String,
    },

    /// A successful remote read was mirrored into the local backup.
    ReadRepaired,

    /// The local backup held an unconfirmed write newer than the remote record.
    PendingBackupPreferred,

    // === Store ===
    /// A persisted document was upgraded to the current schema.
    MigrationApplied {
        /// Version found in storage.
        from_version: u32,
        /// Version written back.
        to_version: u32,
        /// Sections whose stored shape was unusable and fell back to defaults.
        replaced_sections: Vec<String>,
    },

    // === Alternate backend ===
    /// Content was saved to the alternate backend.
    ServerSaveCompleted {
        /// Timestamp echoed by the backend.
        timestamp: String,
    },

    /// A save was dropped because another save was still in flight.
    ServerSaveSkipped,

    /// The alternate backend failed and content went to the server backup key.
    ServerSaveFallback {
        /// Error message.
        error: String,
    },

    // === Mobile refresh ===
    /// Non-essential cache keys were cleared during a forced refresh.
    CacheCleared {
        /// Number of keys removed.
        removed: usize,
        /// Number of keys kept because they were on the preserve list.
        preserved: usize,
    },

    /// A full client reload was requested.
    RefreshRequested {
        /// Cache-busting URL handed to the host.
        url: String,
    },
}

impl SyncEvent {
    /// Create a LocalWriteFailed event.
    pub fn local_write_failed(key: impl Into<String>, error: impl ToString) -> Self {
        Self::LocalWriteFailed {
            key: key.into(),
            error: error.to_string(),
        }
    }

    /// Create a RemoteSaveFailed event.
    pub fn remote_save_failed(platform: PlatformClass, error: impl ToString) -> Self {
        Self::RemoteSaveFailed {
            platform,
            error: error.to_string(),
        }
    }

    /// Create a RemoteLoadFallback event.
    pub fn remote_load_fallback(reason: impl Into<String>) -> Self {
        Self::RemoteLoadFallback {
            reason: reason.into(),
        }
    }

    /// Whether this event reports a failure an operator may want to look at.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::LocalWriteFailed { .. }
                | Self::RemoteSaveFailed { .. }
                | Self::RemoteLoadFallback { .. }
                | Self::ServerSaveSkipped
                | Self::ServerSaveFallback { .. }
        )
    }

    /// Get the event type as a string.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::LocalWriteRecovered { .. } => "LocalWriteRecovered",
            Self::LocalWriteFailed { .. } => "LocalWriteFailed",
            Self::RemoteSaveQueued { .. } => "RemoteSaveQueued",
            Self::RemoteSaveCompleted { .. } => "RemoteSaveCompleted",
            Self::RemoteSaveFailed { .. } => "RemoteSaveFailed",
            Self::RemoteLoadFallback { .. } => "RemoteLoadFallback",
            Self::ReadRepaired => "ReadRepaired",
            Self::PendingBackupPreferred => "PendingBackupPreferred",
            Self::MigrationApplied { .. } => "MigrationApplied",
            Self::ServerSaveCompleted { .. } => "ServerSaveCompleted",
            Self::ServerSaveSkipped => "ServerSaveSkipped",
            Self::ServerSaveFallback { .. } => "ServerSaveFallback",
            Self::CacheCleared { .. } => "CacheCleared",
            Self::RefreshRequested { .. } => "RefreshRequested",
        }
    }
}
