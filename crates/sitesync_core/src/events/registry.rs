//! Event registry for persistence-layer subscriptions.
//!
//! Subscribers receive [`SyncEvent`] notifications from the cache, the
//! remote clients, the background writer and the store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;

use super::sync_event::SyncEvent;

/// A unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback function type for sync events.
///
/// Callbacks run on the emitting task and should not block.
pub type EventCallback = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// Thread-safe registry for managing event subscriptions.
///
/// ```ignore
/// use sitesync_core::events::{EventRegistry, SyncEvent};
/// use std::sync::Arc;
///
/// let registry = EventRegistry::new();
/// let id = registry.subscribe(Arc::new(|event| println!("{:?}", event)));
/// registry.emit(&SyncEvent::ReadRepaired);
/// registry.unsubscribe(id);
/// ```
pub struct EventRegistry {
    callbacks: RwLock<HashMap<SubscriptionId, EventCallback>>,
    next_id: AtomicU64,
}

impl EventRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to sync events.
    ///
    /// Returns a subscription ID that can be used to unsubscribe later.
    pub fn subscribe(&self, callback: EventCallback) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, callback);
        id
    }

    /// Subscribe with a channel instead of a callback.
    ///
    /// The receiver yields every event emitted after this call. Dropping the
    /// receiver makes later sends fail silently; call [`unsubscribe`](Self::unsubscribe)
    /// with the returned id to detach it.
    pub fn channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(Arc::new(move |event| {
            let _ = tx.send(event.clone());
        }));
        (id, rx)
    }

    /// Unsubscribe.
    ///
    /// Returns `true` if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Emit an event to all registered callbacks.
    ///
    /// A panicking callback does not affect the others.
    pub fn emit(&self, event: &SyncEvent) {
        if event.is_failure() {
            log::warn!("[sync] {:?}", event);
        } else {
            log::debug!("[sync] {:?}", event);
        }

        let callbacks = self.callbacks.read().unwrap_or_else(PoisonError::into_inner);
        for callback in callbacks.values() {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(event);
            }));
        }
    }

    /// Get the number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("subscriber_count", &self.subscriber_count())
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .finish()
    }
}
