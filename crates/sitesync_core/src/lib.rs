#![doc = include_str!("../README.md")]

use std::future::Future;
use std::pin::Pin;

/// A boxed future for object-safe async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Composition root (builder and running instance)
pub mod app;

/// Local cache adapter (key/value backends with quota recovery)
pub mod cache;

/// Editor commands (pure reducers over the site state)
pub mod command;

/// Configuration options
pub mod config;

/// Error (common error types)
pub mod error;

/// Events emitted by background and fallback paths
pub mod events;

/// Schema migration for persisted content
pub mod migration;

/// Cache-distrusting remote access and forced refresh for mobile clients
pub mod mobile;

/// Site content document and persisted envelope
pub mod model;

/// Platform classification
pub mod platform;

/// Remote store (singleton record, local backup, read-repair)
pub mod remote;

/// Alternate persistence through the site's own backend
pub mod server_path;

/// Platform-aware state storage
pub mod storage;

/// Versioned state store
pub mod store;

/// Background remote writer
pub mod worker;

#[cfg(test)]
pub mod test_utils;

pub use app::{SiteSync, SiteSyncBuilder};
pub use command::Command;
pub use error::{Result, SiteSyncError};
pub use events::SyncEvent;
pub use model::SiteContent;
