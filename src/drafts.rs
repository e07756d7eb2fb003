//! Autosaved in-progress checklists, one per (site, area).
//!
//! A draft moves `NO_DRAFT -> DRAFTING` on the first mark, is fully replaced
//! on every further mark, and returns to `NO_DRAFT` only when a save has been
//! confirmed. Concurrent saves for the same key are last-write-wins. Drafts
//! never expire on their own.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::db::{self, Store, StoreError};
use crate::model::{ActiveInventoryDraft, DraftSign, Scope};

#[derive(Debug, Clone)]
pub struct DraftManager {
    store: Store,
}

/// Display names carried alongside a draft.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftLabels {
    pub site_name: Option<String>,
    pub area_name: Option<String>,
}

impl DraftManager {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn save_draft(
        &self,
        scope: &Scope,
        labels: &DraftLabels,
        signs: &[DraftSign],
    ) -> Result<ActiveInventoryDraft, StoreError> {
        self.save_draft_at(scope, labels, signs, Utc::now()).await
    }

    /// Replace the draft for `scope`; `last_modified` becomes `now`.
    #[instrument(skip_all, fields(key = %scope.draft_key()))]
    pub async fn save_draft_at(
        &self,
        scope: &Scope,
        labels: &DraftLabels,
        signs: &[DraftSign],
        now: DateTime<Utc>,
    ) -> Result<ActiveInventoryDraft, StoreError> {
        let draft = ActiveInventoryDraft {
            key: scope.draft_key(),
            site_id: scope.site_id.clone(),
            area_id: scope.area_id.clone(),
            site_name: labels.site_name.clone(),
            area_name: labels.area_name.clone(),
            signs: signs.to_vec(),
            created_at: now,
            last_modified: now,
        };
        let stored = db::put_draft(self.store.pool(), &draft).await?;
        debug!(marked = stored.marked().count(), "draft saved");
        Ok(stored)
    }

    pub async fn get_draft(&self, scope: &Scope) -> Result<Option<ActiveInventoryDraft>, StoreError> {
        db::get_draft(self.store.pool(), &scope.draft_key()).await
    }

    /// Only call once a save of the draft's content has been confirmed.
    #[instrument(skip_all, fields(key = %scope.draft_key()))]
    pub async fn delete_draft(&self, scope: &Scope) -> Result<bool, StoreError> {
        let removed = db::delete_draft(self.store.pool(), &scope.draft_key()).await?;
        if removed {
            info!("draft cleared");
        }
        Ok(removed)
    }

    /// Every resident draft, most recently modified first.
    pub async fn list_drafts(&self) -> Result<Vec<ActiveInventoryDraft>, StoreError> {
        db::list_drafts(self.store.pool()).await
    }

    pub async fn draft_count(&self) -> Result<i64, StoreError> {
        db::count_drafts(self.store.pool()).await
    }
}
