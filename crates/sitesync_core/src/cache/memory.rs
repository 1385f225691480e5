//! In-memory key/value store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::KeyValueStore;
use crate::error::{Result, SiteSyncError};

/// In-memory key/value store with an optional byte quota.
///
/// The quota counts key and value bytes. Like browser storage engines, a
/// replacement write must fit alongside the value it replaces, so a full
/// store can only accept a larger value once the old one is evicted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects writes beyond `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Bytes currently in use.
    pub fn usage(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(quota) = self.quota_bytes {
            let usage: usize = entries.iter().map(|(k, v)| k.len() + v.len()).sum();
            let needed = key.len() + value.len();
            if usage + needed > quota {
                return Err(SiteSyncError::QuotaExceeded {
                    key: key.to_string(),
                    bytes: needed,
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.keys().cloned().collect())
    }
}
