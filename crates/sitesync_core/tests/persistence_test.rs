//! Integration tests for the persistence guarantees
//!
//! Local-first durability, remote fallback, the singleton remote record,
//! dropped concurrent saves, quota recovery and the backup written before
//! a failed remote save.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use serde_json::{Value as JsonValue, json};
use tokio::sync::{Notify, Semaphore};

use sitesync_core::BoxFuture;
use sitesync_core::SiteSyncBuilder;
use sitesync_core::cache::{CONTENT_KEY, LocalCache, MemoryStore};
use sitesync_core::command::Command;
use sitesync_core::error::{Result, SiteSyncError};
use sitesync_core::events::{EventRegistry, SyncEvent};
use sitesync_core::mobile::{HeadlessHost, MobileReconciler};
use sitesync_core::model::{CURRENT_VERSION, PersistedEnvelope, SiteContent, SiteState};
use sitesync_core::platform::StaticSignal;
use sitesync_core::remote::{
    CachePolicy, MAIN_RECORD_ID, MemoryTable, RemoteRecord, RemoteStoreClient, RemoteTable,
};
use sitesync_core::server_path::{
    ContentEndpoint, GetContentResponse, SaveContentRequest, SaveContentResponse, SaveOutcome,
    ServerPersistence,
};
use sitesync_core::storage::{LocalOnlyStorage, PlatformStorage, StateStorage};
use sitesync_core::store::{HydrateSource, SiteStore};
use sitesync_core::worker::{BackgroundWriter, WriteTargets};

/// Remote table whose writes wait for a permit.
struct StalledTable {
    inner: MemoryTable,
    permits: Semaphore,
}

impl StalledTable {
    fn new() -> Self {
        Self::over(MemoryTable::new())
    }

    fn over(inner: MemoryTable) -> Self {
        Self {
            inner,
            permits: Semaphore::new(0),
        }
    }
}

impl RemoteTable for StalledTable {
    fn name(&self) -> &str {
        "stalled"
    }

    fn select<'a>(
        &'a self,
        id: &'a str,
        policy: CachePolicy,
    ) -> BoxFuture<'a, Result<Option<RemoteRecord>>> {
        self.inner.select(id, policy)
    }

    fn upsert<'a>(
        &'a self,
        record: &'a RemoteRecord,
        policy: CachePolicy,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let permit = self
                .permits
                .acquire()
                .await
                .map_err(|e| SiteSyncError::RemoteUnavailable(e.to_string()))?;
            permit.forget();
            self.inner.upsert(record, policy).await
        })
    }
}

fn persisted(cache: &LocalCache) -> PersistedEnvelope {
    cache
        .get_json(CONTENT_KEY)
        .expect("content key holds an envelope")
}

/// A current-schema remote row whose hero carries `title`.
fn current_record(title: &str) -> RemoteRecord {
    let mut content = SiteContent::default();
    content.hero.title = title.to_string();
    RemoteRecord::new(MAIN_RECORD_ID, content.to_value()).with_version(CURRENT_VERSION)
}

fn hero_titled(title: &str) -> Command {
    let mut hero = SiteContent::default().hero;
    hero.title = title.to_string();
    Command::SetHero(hero)
}

#[tokio::test]
async fn local_write_is_visible_before_remote_completes() {
    let table = Arc::new(StalledTable::new());
    let sync = SiteSyncBuilder::new().with_remote_table(table.clone()).build();
    sync.hydrate().await;

    let commands = vec![
        hero_titled("First"),
        Command::RemoveApartment { id: "3".to_string() },
        hero_titled("Second"),
        Command::SetSession(sitesync_core::model::UserSession {
            authenticated: true,
            username: Some("owner".to_string()),
        }),
    ];

    for command in commands {
        let report = sync.store().dispatch(command).await.unwrap();
        assert!(report.warning.is_none());

        let envelope = persisted(sync.cache());
        assert_eq!(envelope.version, CURRENT_VERSION);
        assert_eq!(envelope.state, sync.store().snapshot());
        assert_eq!(table.inner.row_count(), 0);
    }

    table.permits.add_permits(16);
    sync.flush().await;

    let row = table.inner.peek(MAIN_RECORD_ID).unwrap();
    assert_eq!(row.data["hero"]["title"], "Second");
}

#[tokio::test]
async fn remote_failure_reads_exact_local_value_and_migrates_it() {
    let events = Arc::new(EventRegistry::new());
    let cache = LocalCache::new(Arc::new(MemoryStore::new()), events.clone());
    let stale = json!({
        "state": {
            "content": { "hero": { "title": "Offline edit" } },
            "user": { "authenticated": true }
        },
        "version": 9
    })
    .to_string();
    cache.set(CONTENT_KEY, &stale).unwrap();

    let table = Arc::new(MemoryTable::new());
    table.set_fail_reads(true);
    let remote = Arc::new(RemoteStoreClient::with_table(table, cache.clone()));
    let mobile = Arc::new(MobileReconciler::new(
        remote.clone(),
        cache.clone(),
        Arc::new(HeadlessHost::default()),
    ));
    let writer = BackgroundWriter::spawn(
        WriteTargets {
            remote: remote.clone(),
            mobile: mobile.clone(),
        },
        8,
        events.clone(),
    );
    let storage = Arc::new(PlatformStorage::new(
        cache.clone(),
        remote,
        mobile,
        writer,
        Arc::new(StaticSignal::new("Mozilla/5.0 (Windows NT 10.0; Win64; x64)")),
    ));

    assert_eq!(storage.get_item(CONTENT_KEY).await, Some(stale));

    let store = SiteStore::new(storage, events);
    let report = store.hydrate().await;

    assert_eq!(report.migrated_from, Some(9));
    let state = store.snapshot();
    assert_eq!(state.content.hero.title, "Offline edit");
    assert_eq!(state.content.hero.subtitle, SiteContent::default().hero.subtitle);
    assert_eq!(state.content.apartments, SiteContent::default().apartments);
    assert!(state.user.authenticated);
}

#[tokio::test]
async fn empty_remote_and_empty_cache_hydrate_to_defaults() {
    let sync = SiteSyncBuilder::new()
        .with_remote_table(Arc::new(MemoryTable::new()))
        .build();

    let report = sync.hydrate().await;

    assert_eq!(report.source, HydrateSource::Default);
    assert_eq!(sync.store().content(), SiteContent::default());
}

#[tokio::test]
async fn sequential_saves_keep_a_single_remote_record() {
    let table = Arc::new(MemoryTable::new());
    let cache = LocalCache::new(Arc::new(MemoryStore::new()), Arc::new(EventRegistry::new()));
    let client = RemoteStoreClient::with_table(table.clone(), cache);

    for i in 0..6 {
        let status = client.save_data(&json!({ "hero": { "title": format!("v{}", i) } })).await;
        assert!(status.is_synced());
    }

    assert_eq!(table.row_count(), 1);
    assert_eq!(
        client.load_data().await,
        Some(json!({ "hero": { "title": "v5" } }))
    );
}

#[tokio::test]
async fn new_session_hydrates_from_remote() {
    let table = Arc::new(MemoryTable::new());
    let first = SiteSyncBuilder::new().with_remote_table(table.clone()).build();
    first.hydrate().await;
    first.store().dispatch(hero_titled("Published")).await.unwrap();
    first.flush().await;

    // Another device with an empty cache
    let second = SiteSyncBuilder::new().with_remote_table(table).build();
    let report = second.hydrate().await;

    assert_eq!(report.source, HydrateSource::Stored);
    assert!(report.replaced_sections.is_empty());
    assert_eq!(second.store().content(), first.store().content());
}

#[tokio::test]
async fn deleted_defaults_stay_deleted_after_sync_and_reload() {
    let table = Arc::new(MemoryTable::new());
    let sync = SiteSyncBuilder::new().with_remote_table(table.clone()).build();
    sync.hydrate().await;

    sync.store()
        .dispatch(Command::RemoveApartment { id: "3".to_string() })
        .await
        .unwrap();
    sync.store()
        .dispatch(Command::RemovePromotion {
            id: "early-booking".to_string(),
        })
        .await
        .unwrap();
    sync.flush().await;
    let upserts = table.upsert_count();

    let expected: Vec<String> = SiteContent::default()
        .apartments
        .into_iter()
        .map(|a| a.id)
        .filter(|id| id != "3")
        .collect();

    let report = sync.hydrate().await;
    sync.flush().await;

    assert_eq!(report.migrated_from, None);
    let content = sync.store().content();
    let ids: Vec<String> = content.apartments.iter().map(|a| a.id.clone()).collect();
    assert_eq!(ids, expected);
    assert!(content.promotions.iter().all(|p| p.id != "early-booking"));
    // Loading a current document writes nothing back
    assert_eq!(table.upsert_count(), upserts);

    let other = SiteSyncBuilder::new().with_remote_table(table).build();
    let report = other.hydrate().await;
    assert_eq!(report.migrated_from, None);
    assert_eq!(other.store().content(), content);
}

#[tokio::test]
async fn reload_before_queue_drains_keeps_latest_edit() {
    let table = Arc::new(StalledTable::over(MemoryTable::with_record(current_record(
        "Old remote",
    ))));
    let sync = SiteSyncBuilder::new().with_remote_table(table.clone()).build();
    sync.hydrate().await;
    assert_eq!(sync.store().content().hero.title, "Old remote");

    sync.store().dispatch(hero_titled("New edit")).await.unwrap();
    let report = sync.hydrate().await;

    assert_eq!(report.migrated_from, None);
    assert_eq!(sync.store().content().hero.title, "New edit");
    assert_eq!(persisted(sync.cache()).state.content.hero.title, "New edit");

    table.permits.add_permits(16);
    sync.flush().await;

    let row = table.inner.peek(MAIN_RECORD_ID).unwrap();
    assert_eq!(row.data["hero"]["title"], "New edit");
    assert_eq!(table.inner.upsert_count(), 1);
}

#[tokio::test]
async fn mobile_reload_after_failed_direct_save_keeps_edit() {
    let table = Arc::new(MemoryTable::with_record(current_record("Old remote")));
    let sync = SiteSyncBuilder::new()
        .with_remote_table(table.clone())
        .with_signal(Arc::new(StaticSignal::new(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)",
        )))
        .build();
    sync.hydrate().await;

    table.set_fail_writes(true);
    sync.store().dispatch(hero_titled("Offline edit")).await.unwrap();
    sync.flush().await;
    sync.hydrate().await;

    assert_eq!(sync.store().content().hero.title, "Offline edit");
    assert_eq!(persisted(sync.cache()).state.content.hero.title, "Offline edit");
    let backup = sync.remote().backup().unwrap();
    assert!(backup.pending);
    assert_eq!(backup.data["hero"]["title"], "Offline edit");

    // Once the remote accepts writes again the next edit goes through
    table.set_fail_writes(false);
    sync.store().dispatch(hero_titled("Back online")).await.unwrap();
    sync.flush().await;
    assert_eq!(
        table.peek(MAIN_RECORD_ID).unwrap().data["hero"]["title"],
        "Back online"
    );
    assert!(!sync.remote().backup().unwrap().pending);
}

/// Endpoint whose saves block until released.
#[derive(Default)]
struct GatedEndpoint {
    entered: Notify,
    gate: Notify,
    saves: AtomicUsize,
    stored: Mutex<Option<JsonValue>>,
}

impl ContentEndpoint for GatedEndpoint {
    fn save<'a>(
        &'a self,
        request: &'a SaveContentRequest,
    ) -> BoxFuture<'a, Result<SaveContentResponse>> {
        Box::pin(async move {
            self.entered.notify_one();
            self.gate.notified().await;
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.stored.lock().unwrap_or_else(PoisonError::into_inner) =
                Some(request.content.clone());
            Ok(SaveContentResponse {
                success: true,
                message: "Content saved".to_string(),
                timestamp: request.timestamp.clone(),
            })
        })
    }

    fn get(&self) -> BoxFuture<'_, Result<Option<GetContentResponse>>> {
        Box::pin(async { Ok(None) })
    }
}

#[tokio::test]
async fn concurrent_server_save_is_dropped() {
    let endpoint = Arc::new(GatedEndpoint::default());
    let events = Arc::new(EventRegistry::new());
    let (_id, mut rx) = events.channel();
    let cache = LocalCache::new(Arc::new(MemoryStore::new()), events);
    let persistence = Arc::new(ServerPersistence::new(endpoint.clone(), cache));

    let first = {
        let persistence = persistence.clone();
        tokio::spawn(async move { persistence.save_content(&json!({ "v": 1 })).await })
    };
    endpoint.entered.notified().await;
    assert!(persistence.is_saving());

    let second = persistence.save_content(&json!({ "v": 2 })).await;
    assert_eq!(second, SaveOutcome::Skipped);
    assert_eq!(rx.recv().await, Some(SyncEvent::ServerSaveSkipped));

    endpoint.gate.notify_one();
    assert!(matches!(first.await.unwrap(), SaveOutcome::Saved { .. }));

    assert_eq!(endpoint.saves.load(Ordering::SeqCst), 1);
    assert_eq!(
        *endpoint.stored.lock().unwrap(),
        Some(json!({ "v": 1 }))
    );
    assert!(!persistence.is_saving());
}

#[tokio::test]
async fn quota_error_is_recovered_and_reported_as_success() {
    let mut small = SiteState::default();
    small.content.hero.title = "a".repeat(300);
    let mut large = SiteState::default();
    large.content.hero.title = "b".repeat(600);
    let small_len = serde_json::to_string(&PersistedEnvelope::current(small.clone()))
        .unwrap()
        .len();
    let large_len = serde_json::to_string(&PersistedEnvelope::current(large.clone()))
        .unwrap()
        .len();

    // Room for one envelope, never for two
    let quota = CONTENT_KEY.len() + large_len + 16;
    assert!(CONTENT_KEY.len() * 2 + small_len + large_len > quota);

    let events = Arc::new(EventRegistry::new());
    let (_id, mut rx) = events.channel();
    let cache = LocalCache::new(Arc::new(MemoryStore::with_quota(quota)), events.clone());
    let store = SiteStore::new(Arc::new(LocalOnlyStorage::new(cache.clone())), events);

    let first = store
        .dispatch(Command::SetHero(small.content.hero.clone()))
        .await
        .unwrap();
    assert!(first.warning.is_none());

    let second = store
        .dispatch(Command::SetHero(large.content.hero.clone()))
        .await
        .unwrap();
    assert!(second.warning.is_none());

    assert_eq!(
        cache.get(CONTENT_KEY),
        Some(serde_json::to_string(&PersistedEnvelope::current(large)).unwrap())
    );
    assert_eq!(
        rx.recv().await,
        Some(SyncEvent::LocalWriteRecovered {
            key: CONTENT_KEY.to_string()
        })
    );
}

#[tokio::test]
async fn failed_remote_save_is_still_loadable() {
    let table = Arc::new(MemoryTable::new());
    table.set_fail_writes(true);
    table.set_fail_reads(true);
    let cache = LocalCache::new(Arc::new(MemoryStore::new()), Arc::new(EventRegistry::new()));
    let client = RemoteStoreClient::with_table(table.clone(), cache);
    let payload = json!({ "hero": { "title": "Unsynced" }, "apartments": [] });

    let status = client.save_data(&payload).await;

    assert!(!status.is_synced());
    assert_eq!(table.row_count(), 0);
    assert_eq!(client.load_data().await, Some(payload));
}
