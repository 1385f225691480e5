//! Structured event stream for background persistence outcomes.

mod registry;
mod sync_event;

pub use registry::{EventCallback, EventRegistry, SubscriptionId};
pub use sync_event::SyncEvent;
