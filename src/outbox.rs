//! Durable queue of writes made while offline, and its replayer.
//!
//! Delivery is at-least-once: an item is removed only after the remote insert
//! is confirmed, so a failure between the remote commit and the local delete
//! replays the item on the next drain.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::db::{self, Store, StoreError};
use crate::model::{PendingInventoryRecord, QueuePayload, SyncQueueItem};
use crate::remote::RemoteService;

/// Result of one pass over the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub synced: Vec<i64>,
    pub failed: Vec<i64>,
    /// Items left after the pass.
    pub remaining: i64,
}

impl DrainReport {
    pub fn attempted(&self) -> usize {
        self.synced.len() + self.failed.len()
    }
}

#[derive(Debug, Clone)]
pub struct SyncQueue {
    store: Store,
    // Serializes overlapping drains within this process.
    drain_lock: Arc<Mutex<()>>,
}

impl SyncQueue {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            drain_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Queue one save's worth of records. Errors must reach the user.
    pub async fn enqueue(&self, records: Vec<PendingInventoryRecord>) -> Result<i64, StoreError> {
        self.enqueue_at(QueuePayload::InventoryRecords(records), Utc::now())
            .await
    }

    #[instrument(skip_all)]
    pub async fn enqueue_at(
        &self,
        payload: QueuePayload,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let id = db::enqueue(self.store.pool(), &payload, now).await?;
        info!(id, kind = payload.kind().as_str(), records = payload.len(), "queued for sync");
        Ok(id)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        db::count_queue(self.store.pool()).await
    }

    pub async fn items(&self) -> Result<Vec<SyncQueueItem>, StoreError> {
        db::list_queue(self.store.pool()).await
    }

    /// Submit every queued item in enqueue order. Failed items stay in place
    /// and do not stop the pass. Only failing to read the queue aborts.
    #[instrument(skip_all)]
    pub async fn drain(&self, remote: &dyn RemoteService) -> Result<DrainReport, StoreError> {
        let _guard = self.drain_lock.lock().await;
        let pool = self.store.pool();
        let mut report = DrainReport::default();

        for row in db::list_queue_rows(pool).await? {
            let item = match row.decode() {
                Ok(item) => item,
                Err(err) => {
                    warn!(?err, id = row.id, "undecodable queue item; leaving in place");
                    report.failed.push(row.id);
                    continue;
                }
            };

            let result = match &item.payload {
                QueuePayload::InventoryRecords(records) if records.is_empty() => {
                    debug!(id = item.id, "empty queue item");
                    Ok(())
                }
                QueuePayload::InventoryRecords(records) => remote
                    .insert_inventory_records(records)
                    .await
                    .map(|confirmed| {
                        debug!(id = item.id, confirmed = confirmed.len(), "remote confirmed insert");
                    }),
            };

            match result {
                Ok(()) => match db::delete_queue_item(pool, item.id).await {
                    Ok(_) => {
                        info!(id = item.id, "queued item synced");
                        report.synced.push(item.id);
                    }
                    Err(err) => {
                        // Stays queued and will be submitted again.
                        warn!(?err, id = item.id, "synced but failed to remove queued item");
                        report.failed.push(item.id);
                    }
                },
                Err(err) => {
                    warn!(?err, id = item.id, "queued item failed; will retry on next drain");
                    report.failed.push(item.id);
                }
            }
        }

        report.remaining = db::count_queue(pool).await?;
        Ok(report)
    }
}
