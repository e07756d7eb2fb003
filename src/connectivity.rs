//! Online/offline signal and the triggers that replay the sync queue.
//!
//! Three things start a drain, all through the same [`SyncQueue::drain`]:
//! the offline to online edge, a platform background-sync callback, and a
//! `SYNC_OFFLINE_DATA` message from a background context.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::db::StoreError;
use crate::outbox::{DrainReport, SyncQueue};
use crate::remote::RemoteService;

/// Tag registered with the platform's background sync facility.
pub const BACKGROUND_SYNC_TAG: &str = "inventory-sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

/// Transient, one-per-transition notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    WentOnline,
    WentOffline,
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Notice::WentOnline => "Back online. Syncing queued inventory.",
            Notice::WentOffline => "You are offline. Changes will be saved locally.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    ConnectivityRestored,
    BackgroundSync,
    WorkerMessage,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::ConnectivityRestored => "connectivity_restored",
            SyncTrigger::BackgroundSync => "background_sync",
            SyncTrigger::WorkerMessage => "worker_message",
        }
    }
}

/// Message posted from a background context to the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    #[serde(rename = "SYNC_OFFLINE_DATA")]
    SyncOfflineData,
}

impl WorkerMessage {
    /// `None` for anything that is not a recognised message.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

#[derive(Debug, Error)]
pub enum BackgroundSyncError {
    #[error("background sync is not supported on this platform")]
    Unsupported,
    #[error("background sync registration failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait BackgroundSyncRegistrar: Send + Sync {
    async fn register(&self, tag: &str) -> Result<(), BackgroundSyncError>;
}

/// Registrar for platforms without background sync.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackgroundSync;

#[async_trait]
impl BackgroundSyncRegistrar for NoBackgroundSync {
    async fn register(&self, _tag: &str) -> Result<(), BackgroundSyncError> {
        Err(BackgroundSyncError::Unsupported)
    }
}

pub struct ConnectivityMonitor {
    online: AtomicBool,
    notices: broadcast::Sender<Notice>,
    queue: SyncQueue,
    remote: Arc<dyn RemoteService>,
}

impl ConnectivityMonitor {
    pub fn new(initial_online: bool, queue: SyncQueue, remote: Arc<dyn RemoteService>) -> Self {
        let (notices, _) = broadcast::channel(16);
        Self {
            online: AtomicBool::new(initial_online),
            notices,
            queue,
            remote,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// One [`Notice`] per online/offline transition.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Register for background sync, tolerating platforms without it.
    /// Returns whether registration took effect.
    pub async fn register_background_sync(&self, registrar: &dyn BackgroundSyncRegistrar) -> bool {
        match registrar.register(BACKGROUND_SYNC_TAG).await {
            Ok(()) => {
                info!(tag = BACKGROUND_SYNC_TAG, "background sync registered");
                true
            }
            Err(BackgroundSyncError::Unsupported) => {
                debug!("background sync unsupported");
                false
            }
            Err(err) => {
                error!(?err, "background sync registration failed");
                false
            }
        }
    }

    /// Apply a platform connectivity event. On the offline to online edge a
    /// drain is spawned and its handle returned. Repeated events in the same
    /// state are ignored.
    pub fn handle_event(&self, event: ConnectivityEvent) -> Option<JoinHandle<()>> {
        let now_online = event == ConnectivityEvent::Online;
        let was_online = self.online.swap(now_online, Ordering::SeqCst);
        match (was_online, now_online) {
            (false, true) => {
                info!("connectivity restored");
                let _ = self.notices.send(Notice::WentOnline);
                Some(self.request_sync(SyncTrigger::ConnectivityRestored))
            }
            (true, false) => {
                info!("connectivity lost");
                let _ = self.notices.send(Notice::WentOffline);
                None
            }
            _ => None,
        }
    }

    /// Handle a raw message from a background context.
    pub fn handle_worker_message(&self, raw: &str) -> Option<JoinHandle<()>> {
        match WorkerMessage::parse(raw) {
            Some(WorkerMessage::SyncOfflineData) => {
                Some(self.request_sync(SyncTrigger::WorkerMessage))
            }
            None => {
                debug!(%raw, "ignoring worker message");
                None
            }
        }
    }

    /// Fire-and-forget drain; errors are logged.
    pub fn request_sync(&self, trigger: SyncTrigger) -> JoinHandle<()> {
        let queue = self.queue.clone();
        let remote = self.remote.clone();
        tokio::spawn(async move {
            if let Err(err) = run_drain(&queue, remote.as_ref(), trigger).await {
                error!(?err, trigger = trigger.as_str(), "sync queue drain failed");
            }
        })
    }

    /// Drain and wait for the result.
    pub async fn sync_now(&self, trigger: SyncTrigger) -> Result<DrainReport, StoreError> {
        run_drain(&self.queue, self.remote.as_ref(), trigger).await
    }

    /// Consume connectivity events until the stream ends.
    pub async fn run<S>(&self, events: S)
    where
        S: Stream<Item = ConnectivityEvent>,
    {
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            self.handle_event(event);
        }
    }
}

#[instrument(skip_all, fields(trigger = trigger.as_str()))]
async fn run_drain(
    queue: &SyncQueue,
    remote: &dyn RemoteService,
    trigger: SyncTrigger,
) -> Result<DrainReport, StoreError> {
    let report = queue.drain(remote).await?;
    if report.attempted() > 0 {
        info!(
            synced = report.synced.len(),
            failed = report.failed.len(),
            remaining = report.remaining,
            "sync queue drained"
        );
    }
    if !report.failed.is_empty() {
        warn!(remaining = report.remaining, "some queued items are still pending");
    }
    Ok(report)
}

/// Poll `probe` every `interval` and yield an event whenever its answer differs
/// from the last one, starting from `initial`.
pub fn probe_stream<F, Fut>(
    interval: Duration,
    initial: bool,
    probe: F,
) -> impl Stream<Item = ConnectivityEvent>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let ticker = tokio::time::interval(interval);
    futures::stream::unfold(
        (probe, ticker, initial),
        |(mut probe, mut ticker, mut last)| async move {
            loop {
                ticker.tick().await;
                let online = probe().await;
                if online != last {
                    last = online;
                    let event = if online {
                        ConnectivityEvent::Online
                    } else {
                        ConnectivityEvent::Offline
                    };
                    return Some((event, (probe, ticker, last)));
                }
            }
        },
    )
}
