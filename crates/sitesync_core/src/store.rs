//! Versioned state store.
//!
//! Holds the live [`SiteState`], hydrates it from [`StateStorage`] on
//! start (migrating stale documents), and persists it after every
//! [`Command`]. Commands run one at a time; readers take snapshots and
//! never wait on storage.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use crate::cache::CONTENT_KEY;
use crate::command::Command;
use crate::error::{Result, SerializableError};
use crate::events::{EventRegistry, SyncEvent};
use crate::migration::{migrate_content, needs_migration};
use crate::model::{CURRENT_VERSION, PersistedEnvelope, SiteContent, SiteState, UserSession};
use crate::storage::StateStorage;

/// Where hydrated state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HydrateSource {
    /// A readable envelope from storage.
    Stored,
    /// Nothing usable in storage; the compiled default.
    Default,
}

/// What [`SiteStore::hydrate`] did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HydrateReport {
    pub source: HydrateSource,
    /// Stored version, when the document was migrated.
    pub migrated_from: Option<u32>,
    /// Sections reset to defaults during migration.
    pub replaced_sections: Vec<String>,
}

/// Result of a successful [`SiteStore::dispatch`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    /// Set when the new state could not be written locally.
    ///
    /// The in-memory state is updated regardless; this is the one failure
    /// the editor is told about.
    pub warning: Option<SerializableError>,
}

/// Live site state with persistence.
pub struct SiteStore {
    storage: Arc<dyn StateStorage>,
    key: String,
    state: RwLock<SiteState>,
    write_lock: Mutex<()>,
    events: Arc<EventRegistry>,
}

impl SiteStore {
    /// Create a store holding the compiled default until hydrated.
    pub fn new(storage: Arc<dyn StateStorage>, events: Arc<EventRegistry>) -> Self {
        Self {
            storage,
            key: CONTENT_KEY.to_string(),
            state: RwLock::new(SiteState::default()),
            write_lock: Mutex::new(()),
            events,
        }
    }

    /// Persist under a different key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SiteState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Copy of the current content.
    pub fn content(&self) -> SiteContent {
        self.snapshot().content
    }

    fn replace_state(&self, state: SiteState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Load state from storage, migrating it if it is stale.
    pub async fn hydrate(&self) -> HydrateReport {
        let _guard = self.write_lock.lock().await;

        let raw = self.storage.get_item(&self.key).await;
        let Some((version, content, user)) = raw.as_deref().and_then(parse_envelope) else {
            log::info!("[store] No usable stored state, starting from defaults");
            let user = self.snapshot().user;
            self.replace_state(SiteState {
                content: SiteContent::default(),
                user,
            });
            return HydrateReport {
                source: HydrateSource::Default,
                migrated_from: None,
                replaced_sections: Vec::new(),
            };
        };

        if !needs_migration(version, &content) {
            match SiteContent::deserialize(&content) {
                Ok(content) => {
                    self.replace_state(SiteState { content, user });
                    return HydrateReport {
                        source: HydrateSource::Stored,
                        migrated_from: None,
                        replaced_sections: Vec::new(),
                    };
                }
                Err(e) => log::error!("[store] Current-version content failed to load: {}", e),
            }
        }

        let outcome = migrate_content(&content);
        log::info!(
            "[store] Migrated stored state from version {} to {}",
            version,
            CURRENT_VERSION
        );
        self.events.emit(&SyncEvent::MigrationApplied {
            from_version: version,
            to_version: CURRENT_VERSION,
            replaced_sections: outcome.replaced_sections.clone(),
        });

        let state = SiteState {
            content: outcome.content,
            user,
        };
        self.replace_state(state.clone());
        if let Err(e) = self.persist(&state).await {
            log::warn!("[store] Could not persist migrated state: {}", e);
        }

        HydrateReport {
            source: HydrateSource::Stored,
            migrated_from: Some(version),
            replaced_sections: outcome.replaced_sections,
        }
    }

    /// Apply a command and persist the result.
    ///
    /// Returns an error only when the command itself is invalid, in which
    /// case the state is unchanged. Storage problems come back as a
    /// [`DispatchReport::warning`].
    pub async fn dispatch(&self, command: Command) -> Result<DispatchReport> {
        let _guard = self.write_lock.lock().await;

        let next = command.apply(&self.snapshot())?;
        self.replace_state(next.clone());
        log::debug!("[store] Applied {}", command.name());

        let warning = match self.persist(&next).await {
            Ok(()) => None,
            Err(e) => {
                log::warn!("[store] {} applied but not saved locally: {}", command.name(), e);
                Some(e.to_serializable())
            }
        };
        Ok(DispatchReport { warning })
    }

    /// Drop the persisted state. The in-memory state is kept.
    pub async fn clear_persisted(&self) {
        let _guard = self.write_lock.lock().await;
        self.storage.remove_item(&self.key).await;
    }

    async fn persist(&self, state: &SiteState) -> Result<()> {
        let raw = serde_json::to_string(&PersistedEnvelope::current(state.clone()))?;
        self.storage.set_item(&self.key, raw).await
    }
}

/// Split a raw envelope into version, content and session.
///
/// Lenient: a missing version reads as 0 and a missing or malformed
/// session as logged out. `None` when there is no content object at all.
fn parse_envelope(raw: &str) -> Option<(u32, JsonValue, UserSession)> {
    let value: JsonValue = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("[store] Stored state is not JSON: {}", e);
            return None;
        }
    };

    let state = value.get("state")?;
    let content = state.get("content").filter(|c| c.is_object())?.clone();
    let user = state
        .get("user")
        .and_then(|u| serde_json::from_value(u.clone()).ok())
        .unwrap_or_default();
    let version = value
        .get("version")
        .and_then(JsonValue::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0);

    Some((version, content, user))
}

impl fmt::Debug for SiteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{LocalCache, MemoryStore};
    use crate::storage::LocalOnlyStorage;
    use crate::test_utils::{FailingStore, record_events};
    use serde_json::json;

    fn store_over(cache: LocalCache) -> SiteStore {
        let events = cache.events().clone();
        SiteStore::new(Arc::new(LocalOnlyStorage::new(cache)), events)
    }

    fn memory_cache() -> LocalCache {
        LocalCache::new(Arc::new(MemoryStore::new()), Arc::new(EventRegistry::new()))
    }

    #[tokio::test]
    async fn test_hydrate_empty_storage_uses_defaults() {
        let store = store_over(memory_cache());
        let report = store.hydrate().await;
        assert_eq!(report.source, HydrateSource::Default);
        assert_eq!(store.content(), SiteContent::default());
    }

    #[tokio::test]
    async fn test_hydrate_garbage_uses_defaults() {
        let cache = memory_cache();
        cache.set(CONTENT_KEY, "not json at all").unwrap();
        let store = store_over(cache);

        assert_eq!(store.hydrate().await.source, HydrateSource::Default);
    }

    #[tokio::test]
    async fn test_hydrate_current_version_is_untouched() {
        let cache = memory_cache();
        let mut state = SiteState::default();
        state.content.hero.title = "Kept".to_string();
        cache
            .set_json(CONTENT_KEY, &PersistedEnvelope::current(state.clone()))
            .unwrap();
        let log = record_events(cache.events());
        let store = store_over(cache);

        let report = store.hydrate().await;

        assert_eq!(report.migrated_from, None);
        assert_eq!(store.snapshot(), state);
        assert!(log.events().is_empty());
    }

    #[tokio::test]
    async fn test_hydrate_migrates_and_persists_stale_state() {
        let cache = memory_cache();
        cache
            .set(
                CONTENT_KEY,
                &json!({
                    "state": {
                        "content": { "apartments": [{ "id": "2", "name": "Custom Name" }] },
                        "user": { "authenticated": true }
                    },
                    "version": 10
                })
                .to_string(),
            )
            .unwrap();
        let log = record_events(cache.events());
        let store = store_over(cache.clone());

        let report = store.hydrate().await;

        assert_eq!(report.migrated_from, Some(10));
        let state = store.snapshot();
        assert!(state.user.authenticated);
        assert_eq!(state.content.apartment("2").unwrap().name, "Custom Name");
        assert_eq!(state.content.apartment("2").unwrap().min_nights, 3);
        assert_eq!(log.events()[0].event_type(), "MigrationApplied");

        let persisted: PersistedEnvelope = cache.get_json(CONTENT_KEY).unwrap();
        assert_eq!(persisted.version, CURRENT_VERSION);
        assert_eq!(persisted.state, state);

        // Second hydrate finds a current document and does not migrate again
        assert_eq!(store.hydrate().await.migrated_from, None);
    }

    #[tokio::test]
    async fn test_dispatch_persists_every_mutation() {
        let cache = memory_cache();
        let store = store_over(cache.clone());
        store.hydrate().await;

        let report = store
            .dispatch(Command::RemoveApartment { id: "3".to_string() })
            .await
            .unwrap();

        assert!(report.warning.is_none());
        let persisted: PersistedEnvelope = cache.get_json(CONTENT_KEY).unwrap();
        assert_eq!(persisted.state.content.apartments.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_command_leaves_state() {
        let store = store_over(memory_cache());
        let before = store.snapshot();

        let result = store
            .dispatch(Command::RemoveReview { id: "x".to_string() })
            .await;

        assert!(result.is_err());
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_local_write_failure_is_a_warning() {
        let cache = LocalCache::new(Arc::new(FailingStore::unavailable()), Arc::new(EventRegistry::new()));
        let store = store_over(cache);
        let mut hero = SiteContent::default().hero;
        hero.title = "Offline edit".to_string();

        let report = store.dispatch(Command::SetHero(hero)).await.unwrap();

        assert_eq!(report.warning.unwrap().kind, "StorageUnavailable");
        assert_eq!(store.content().hero.title, "Offline edit");
    }

    #[test]
    fn test_parse_envelope_is_lenient() {
        let (version, content, user) =
            parse_envelope(r#"{"state":{"content":{"hero":{}},"user":"bogus"}}"#).unwrap();
        assert_eq!(version, 0);
        assert!(content.is_object());
        assert_eq!(user, UserSession::default());

        assert!(parse_envelope(r#"{"state":{"content":[]}}"#).is_none());
    }
}
