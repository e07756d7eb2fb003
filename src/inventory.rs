//! Checklist flow: load reference data, autosave marks, save or queue results.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::cache::CacheManager;
use crate::db::StoreError;
use crate::drafts::{DraftLabels, DraftManager};
use crate::model::{
    ActiveInventoryDraft, Area, DraftSign, PendingInventoryRecord, QueuePayload, Scope,
    SignStatus, Site,
};
use crate::outbox::SyncQueue;
use crate::remote::{CatalogSort, RemoteError, RemoteService};

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("no signs have been recorded")]
    NothingRecorded,
    #[error("failed to save inventory: {0}")]
    Remote(#[from] RemoteError),
    #[error("failed to queue inventory for sync: {0}")]
    QueueWrite(#[source] StoreError),
}

/// The site, and optionally the area, a checklist is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub site: Site,
    pub area: Option<Area>,
}

impl Selection {
    pub fn new(site: Site, area: Option<Area>) -> Self {
        Self { site, area }
    }

    pub fn scope(&self) -> Scope {
        Scope {
            site_id: self.site.id.clone(),
            area_id: self.area.as_ref().map(|a| a.id.clone()),
        }
    }

    fn labels(&self) -> DraftLabels {
        DraftLabels {
            site_name: Some(self.site.name.clone()),
            area_name: self.area.as_ref().map(|a| a.name.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecklistSource {
    /// Resumed from an autosaved draft; the catalog was not consulted.
    Draft,
    Remote,
    Cache,
    /// Nothing usable offline.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checklist {
    pub source: ChecklistSource,
    pub signs: Vec<DraftSign>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Synced { session_id: String, records: usize },
    Queued { queue_id: i64, records: usize },
}

impl SaveOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            SaveOutcome::Synced { .. } => "Inventory saved successfully!",
            SaveOutcome::Queued { .. } => {
                "Inventory saved offline. Will sync when connection is restored."
            }
        }
    }
}

/// Inventory rows for every marked sign; unset signs are skipped.
pub fn build_records(
    session_id: &str,
    site_id: &str,
    signs: &[DraftSign],
) -> Vec<PendingInventoryRecord> {
    signs
        .iter()
        .filter_map(|sign| {
            sign.status
                .inventory_type()
                .map(|inventory_type| PendingInventoryRecord {
                    session_id: session_id.to_string(),
                    site_id: site_id.to_string(),
                    inventory_type,
                    sign_number: sign.sign_number.clone(),
                    description_id: sign.description_id.clone(),
                    quantity: 1,
                    notes: None,
                })
        })
        .collect()
}

#[derive(Clone)]
pub struct ChecklistService {
    cache: CacheManager,
    drafts: DraftManager,
    queue: SyncQueue,
    remote: Arc<dyn RemoteService>,
}

impl ChecklistService {
    pub fn new(
        cache: CacheManager,
        drafts: DraftManager,
        queue: SyncQueue,
        remote: Arc<dyn RemoteService>,
    ) -> Self {
        Self {
            cache,
            drafts,
            queue,
            remote,
        }
    }

    pub fn drafts(&self) -> &DraftManager {
        &self.drafts
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Sites for the picker. Failures degrade to the cache, then to empty.
    #[instrument(skip_all)]
    pub async fn load_sites(&self, online: bool) -> Vec<Site> {
        if online {
            match self.remote.fetch_sites().await {
                Ok(sites) => {
                    for site in &sites {
                        if let Err(err) = self.cache.cache_site(site).await {
                            warn!(?err, site = %site.id, "failed to cache site");
                        }
                    }
                    return sites;
                }
                Err(err) => warn!(?err, "failed to fetch sites; using cache"),
            }
        }
        self.cache.get_cached_sites().await.unwrap_or_else(|err| {
            warn!(?err, "failed to read cached sites");
            Vec::new()
        })
    }

    #[instrument(skip_all, fields(site = %site_id))]
    pub async fn load_areas(&self, site_id: &str, online: bool) -> Vec<Area> {
        if online {
            match self.remote.fetch_areas(site_id).await {
                Ok(areas) => {
                    if let Err(err) = self.cache.cache_areas(site_id, &areas).await {
                        warn!(?err, "failed to cache areas");
                    }
                    return areas;
                }
                Err(err) => warn!(?err, "failed to fetch areas; using cache"),
            }
        }
        self.cache.get_cached_areas(site_id).await.unwrap_or_else(|err| {
            warn!(?err, "failed to read cached areas");
            Vec::new()
        })
    }

    /// Resume a draft with at least one mark if one exists, otherwise build a
    /// fresh checklist from the catalog (remote when online, cache otherwise).
    #[instrument(skip_all, fields(key = %selection.scope().draft_key()))]
    pub async fn load_checklist(
        &self,
        selection: &Selection,
        online: bool,
        sort: CatalogSort,
    ) -> Checklist {
        let scope = selection.scope();
        match self.drafts.get_draft(&scope).await {
            Ok(Some(draft)) if draft.marked().next().is_none() => {
                debug!("draft has no marks; loading catalog");
            }
            Ok(Some(draft)) => {
                info!(signs = draft.signs.len(), "resuming draft");
                return Checklist {
                    source: ChecklistSource::Draft,
                    signs: draft.signs,
                };
            }
            Ok(None) => {}
            Err(err) => warn!(?err, "failed to read draft; starting fresh"),
        }

        if online {
            let area_name = selection.area.as_ref().map(|a| a.name.as_str());
            match self
                .remote
                .fetch_catalog(&scope.site_id, area_name, sort)
                .await
            {
                Ok(mut entries) => {
                    for entry in entries.iter_mut() {
                        if entry.area_id.is_none() {
                            entry.area_id = scope.area_id.clone();
                        }
                    }
                    if !entries.is_empty() {
                        if let Err(err) = self.cache.cache_catalog(&scope, &entries).await {
                            warn!(?err, "failed to cache catalog");
                        }
                    }
                    return Checklist {
                        source: ChecklistSource::Remote,
                        signs: entries.iter().map(DraftSign::from).collect(),
                    };
                }
                Err(err) => warn!(?err, "failed to fetch catalog; using cache"),
            }
        }

        match self.cache.get_cached_catalog(&scope).await {
            Ok(Some(entries)) => Checklist {
                source: ChecklistSource::Cache,
                signs: entries.iter().map(DraftSign::from).collect(),
            },
            Ok(None) => Checklist {
                source: ChecklistSource::Empty,
                signs: Vec::new(),
            },
            Err(err) => {
                warn!(?err, "failed to read cached catalog");
                Checklist {
                    source: ChecklistSource::Empty,
                    signs: Vec::new(),
                }
            }
        }
    }

    /// Persist the current checklist state. Called after every change.
    pub async fn autosave(
        &self,
        selection: &Selection,
        signs: &[DraftSign],
    ) -> Result<ActiveInventoryDraft, StoreError> {
        self.drafts
            .save_draft(&selection.scope(), &selection.labels(), signs)
            .await
    }

    /// Set `status` on every sign in `ids` and autosave. Returns how many changed.
    ///
    /// Nothing is written when no sign changed, so a draft only comes into
    /// being with the first real mark.
    pub async fn mark(
        &self,
        selection: &Selection,
        signs: &mut [DraftSign],
        ids: &[&str],
        status: SignStatus,
    ) -> Result<usize, StoreError> {
        let mut changed = 0;
        for sign in signs
            .iter_mut()
            .filter(|s| ids.contains(&s.id.as_str()) && s.status != status)
        {
            sign.status = status;
            changed += 1;
        }
        if changed == 0 {
            return Ok(0);
        }
        self.autosave(selection, signs).await?;
        Ok(changed)
    }

    pub async fn save(
        &self,
        selection: &Selection,
        signs: &[DraftSign],
        online: bool,
    ) -> Result<SaveOutcome, SaveError> {
        self.save_at(selection, signs, online, Utc::now()).await
    }

    /// Submit marked signs directly (online) or through the sync queue
    /// (offline). The draft is cleared only after either path succeeds.
    #[instrument(skip_all, fields(key = %selection.scope().draft_key(), online = online))]
    pub async fn save_at(
        &self,
        selection: &Selection,
        signs: &[DraftSign],
        online: bool,
        now: DateTime<Utc>,
    ) -> Result<SaveOutcome, SaveError> {
        let scope = selection.scope();
        if signs.iter().all(|s| s.status == SignStatus::Unset) {
            return Err(SaveError::NothingRecorded);
        }

        let outcome = if online {
            let label = format!("Inventory - {}", now.format("%Y-%m-%d %H:%M:%S"));
            let session_id = self.remote.create_session(&scope.site_id, &label).await?;
            let records = build_records(&session_id, &scope.site_id, signs);
            self.remote.insert_inventory_records(&records).await?;
            SaveOutcome::Synced {
                session_id,
                records: records.len(),
            }
        } else {
            let session_id = format!("offline-{}", now.timestamp_millis());
            let records = build_records(&session_id, &scope.site_id, signs);
            let count = records.len();
            let queue_id = self
                .queue
                .enqueue_at(QueuePayload::InventoryRecords(records), now)
                .await
                .map_err(SaveError::QueueWrite)?;
            SaveOutcome::Queued {
                queue_id,
                records: count,
            }
        };

        // The save is committed at this point; a stale draft is the lesser harm.
        if let Err(err) = self.drafts.delete_draft(&scope).await {
            warn!(?err, "saved but failed to clear draft");
        }
        info!(?outcome, "inventory saved");
        Ok(outcome)
    }

    /// Queued saves awaiting sync.
    pub async fn pending_count(&self) -> Result<i64, StoreError> {
        self.queue.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InventoryType;

    fn sign(id: &str, status: SignStatus) -> DraftSign {
        DraftSign {
            id: id.into(),
            sign_number: format!("N-{id}"),
            description_id: Some(format!("d-{id}")),
            sign_type_code: None,
            description: None,
            side_a_message: None,
            side_b_message: None,
            status,
        }
    }

    #[test]
    fn records_skip_unset_signs() {
        let signs = vec![
            sign("1", SignStatus::Present),
            sign("2", SignStatus::Unset),
            sign("3", SignStatus::Damaged),
        ];
        let records = build_records("sess", "s1", &signs);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sign_number, "N-1");
        assert_eq!(records[0].inventory_type, InventoryType::Present);
        assert_eq!(records[0].description_id.as_deref(), Some("d-1"));
        assert_eq!(records[1].inventory_type, InventoryType::Damaged);
        assert!(records.iter().all(|r| r.quantity == 1 && r.notes.is_none()));
        assert!(records.iter().all(|r| r.session_id == "sess" && r.site_id == "s1"));
    }

    #[test]
    fn selection_scope_and_labels() {
        let selection = Selection::new(
            Site {
                id: "s1".into(),
                name: "Tower".into(),
                location: None,
            },
            Some(Area {
                id: "a1".into(),
                site_id: "s1".into(),
                name: "Level 1".into(),
            }),
        );
        assert_eq!(selection.scope(), Scope::new("s1", Some("a1")));
        let labels = selection.labels();
        assert_eq!(labels.site_name.as_deref(), Some("Tower"));
        assert_eq!(labels.area_name.as_deref(), Some("Level 1"));
    }
}
