//! Row-shaped records returned by repositories.
//!
//! Keep these structs focused on what is stored. Staleness and save policy
//! live in the components above.

use super::StoreError;
use crate::model::{QueueKind, QueuePayload, SignCatalogEntry, SyncQueueItem};
use chrono::{DateTime, Utc};

/// A cached catalog for one (site, area) key. Always written whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSnapshot {
    pub key: String,
    pub site_id: String,
    pub area_id: Option<String>,
    pub entries: Vec<SignCatalogEntry>,
    pub cached_at: DateTime<Utc>,
}

/// Undecoded sync queue row. Decoding happens per row so one bad payload does
/// not hide the rest of the queue.
#[derive(Debug, Clone)]
pub struct QueueRow {
    pub id: i64,
    pub kind: String,
    pub payload: String,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueRow {
    pub fn decode(&self) -> Result<SyncQueueItem, StoreError> {
        let payload: QueuePayload =
            serde_json::from_str(&self.payload).map_err(|source| StoreError::Corrupt {
                table: "sync_queue",
                source,
            })?;
        if QueueKind::parse_kind(&self.kind) != Some(payload.kind()) {
            tracing::warn!(
                id = self.id,
                kind = %self.kind,
                "sync queue kind column disagrees with payload tag"
            );
        }
        Ok(SyncQueueItem {
            id: self.id,
            payload,
            enqueued_at: self.enqueued_at,
        })
    }
}
