//! Background remote writer.
//!
//! The local write and the pending backup finish before `set_item`
//! returns; the remote write is queued here and performed by a single task in submission order. The
//! outcome of each job is published on the event stream.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::events::{EventRegistry, SyncEvent};
use crate::mobile::MobileReconciler;
use crate::platform::PlatformClass;
use crate::remote::{CachePolicy, LocalBackupRecord, RemoteStoreClient, RemoteWriteStatus};

/// Default number of jobs that may wait in the queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

enum Job {
    Write {
        platform: PlatformClass,
        staged: LocalBackupRecord,
    },
    Flush(oneshot::Sender<()>),
}

/// Where background writes go, per platform class.
#[derive(Debug, Clone)]
pub struct WriteTargets {
    pub remote: Arc<RemoteStoreClient>,
    pub mobile: Arc<MobileReconciler>,
}

/// Handle to the background write queue.
///
/// Cloning shares the queue. The worker task stops once every handle is
/// dropped and the queue is drained.
#[derive(Debug, Clone)]
pub struct BackgroundWriter {
    tx: mpsc::Sender<Job>,
    events: Arc<EventRegistry>,
}

impl BackgroundWriter {
    /// Start the worker task. Must be called inside a tokio runtime.
    pub fn spawn(targets: WriteTargets, capacity: usize, events: Arc<EventRegistry>) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run(rx, targets, events.clone()));
        Self { tx, events }
    }

    /// Queue the remote write of a staged backup. Waits while the queue is full.
    ///
    /// Returns `false` if the worker is gone and the write was dropped.
    /// The staged backup stays pending in that case.
    pub async fn enqueue(&self, platform: PlatformClass, staged: LocalBackupRecord) -> bool {
        match self.tx.send(Job::Write { platform, staged }).await {
            Ok(()) => {
                self.events.emit(&SyncEvent::RemoteSaveQueued { platform });
                true
            }
            Err(_) => {
                log::error!("[worker] Background writer stopped, remote write dropped");
                false
            }
        }
    }

    /// Wait until every write queued before this call has finished.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Job::Flush(done_tx)).await.is_err() {
            return;
        }
        let _ = done_rx.await;
    }
}

async fn run(mut rx: mpsc::Receiver<Job>, targets: WriteTargets, events: Arc<EventRegistry>) {
    log::debug!("[worker] Background writer started");
    while let Some(job) = rx.recv().await {
        match job {
            Job::Write { platform, staged } => {
                let result = write(&targets, platform, &staged).await;
                let event = match result {
                    Ok(()) => SyncEvent::RemoteSaveCompleted { platform },
                    Err(reason) => SyncEvent::remote_save_failed(platform, reason),
                };
                events.emit(&event);
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    log::debug!("[worker] Background writer stopped");
}

async fn write(
    targets: &WriteTargets,
    platform: PlatformClass,
    staged: &LocalBackupRecord,
) -> std::result::Result<(), String> {
    match platform {
        PlatformClass::Standard => {
            match targets.remote.upload(staged, CachePolicy::Default).await {
                RemoteWriteStatus::Synced => Ok(()),
                RemoteWriteStatus::BackedUpLocally { reason } => Err(reason),
            }
        }
        PlatformClass::MobileAggressive => {
            if targets.mobile.upload_direct(staged).await {
                Ok(())
            } else {
                Err("direct remote write failed".to_string())
            }
        }
    }
}
