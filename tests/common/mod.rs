#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use sign_inventory_sync::db::Store;
use sign_inventory_sync::model::{
    Area, InventoryRecord, PendingInventoryRecord, SignCatalogEntry, Site,
};
use sign_inventory_sync::remote::{CatalogSort, RemoteError, RemoteService};

pub async fn memory_store() -> Store {
    Store::open("sqlite::memory:").await.unwrap()
}

pub fn file_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}", dir.path().join("inventory.db").display())
}

pub fn site(id: &str) -> Site {
    Site {
        id: id.into(),
        name: format!("Site {id}"),
        location: None,
    }
}

pub fn area(id: &str, site_id: &str) -> Area {
    Area {
        id: id.into(),
        site_id: site_id.into(),
        name: format!("Area {id}"),
    }
}

pub fn entry(id: &str, site_id: &str) -> SignCatalogEntry {
    SignCatalogEntry {
        id: id.into(),
        site_id: site_id.into(),
        area_id: None,
        sign_number: format!("SN-{id}"),
        description_id: Some(format!("desc-{id}")),
        side_a_message: None,
        side_b_message: None,
        legacy: Default::default(),
        description: Some(format!("Sign {id}")),
        sign_type_code: Some("EX".into()),
    }
}

fn down() -> RemoteError {
    RemoteError::Service {
        status: 503,
        body: "unavailable".into(),
    }
}

/// Scriptable in-memory remote that records every call.
#[derive(Clone, Default)]
pub struct RecordingRemote {
    catalog: Arc<Mutex<Vec<SignCatalogEntry>>>,
    sites: Arc<Mutex<Vec<Site>>>,
    areas: Arc<Mutex<Vec<Area>>>,
    unreachable: Arc<Mutex<bool>>,
    // Outcomes for successive insert calls; `true` succeeds. Empty means succeed.
    insert_script: Arc<Mutex<VecDeque<bool>>>,
    catalog_calls: Arc<Mutex<Vec<(String, Option<String>)>>>,
    session_calls: Arc<Mutex<Vec<(String, String)>>>,
    insert_calls: Arc<Mutex<Vec<Vec<PendingInventoryRecord>>>>,
    inserted: Arc<Mutex<Vec<InventoryRecord>>>,
}

impl RecordingRemote {
    pub fn with_catalog(entries: Vec<SignCatalogEntry>) -> Self {
        Self {
            catalog: Arc::new(Mutex::new(entries)),
            ..Default::default()
        }
    }

    pub async fn set_sites(&self, sites: Vec<Site>, areas: Vec<Area>) {
        *self.sites.lock().await = sites;
        *self.areas.lock().await = areas;
    }

    pub async fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().await = unreachable;
    }

    pub async fn script_inserts(&self, outcomes: Vec<bool>) {
        *self.insert_script.lock().await = VecDeque::from(outcomes);
    }

    pub async fn catalog_calls(&self) -> Vec<(String, Option<String>)> {
        self.catalog_calls.lock().await.clone()
    }

    pub async fn session_calls(&self) -> Vec<(String, String)> {
        self.session_calls.lock().await.clone()
    }

    pub async fn insert_calls(&self) -> Vec<Vec<PendingInventoryRecord>> {
        self.insert_calls.lock().await.clone()
    }

    pub async fn inserted(&self) -> Vec<InventoryRecord> {
        self.inserted.lock().await.clone()
    }

    async fn check_reachable(&self) -> Result<(), RemoteError> {
        if *self.unreachable.lock().await {
            Err(down())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteService for RecordingRemote {
    async fn fetch_catalog(
        &self,
        site_id: &str,
        area_name: Option<&str>,
        _sort: CatalogSort,
    ) -> Result<Vec<SignCatalogEntry>, RemoteError> {
        self.catalog_calls
            .lock()
            .await
            .push((site_id.to_string(), area_name.map(str::to_string)));
        self.check_reachable().await?;
        Ok(self
            .catalog
            .lock()
            .await
            .iter()
            .filter(|e| e.site_id == site_id)
            .cloned()
            .collect())
    }

    async fn fetch_sites(&self) -> Result<Vec<Site>, RemoteError> {
        self.check_reachable().await?;
        Ok(self.sites.lock().await.clone())
    }

    async fn fetch_areas(&self, site_id: &str) -> Result<Vec<Area>, RemoteError> {
        self.check_reachable().await?;
        Ok(self
            .areas
            .lock()
            .await
            .iter()
            .filter(|a| a.site_id == site_id)
            .cloned()
            .collect())
    }

    async fn create_session(&self, site_id: &str, label: &str) -> Result<String, RemoteError> {
        self.check_reachable().await?;
        let mut calls = self.session_calls.lock().await;
        calls.push((site_id.to_string(), label.to_string()));
        Ok(format!("session-{}", calls.len()))
    }

    async fn insert_inventory_records(
        &self,
        records: &[PendingInventoryRecord],
    ) -> Result<Vec<InventoryRecord>, RemoteError> {
        self.insert_calls.lock().await.push(records.to_vec());
        self.check_reachable().await?;
        let ok = self.insert_script.lock().await.pop_front().unwrap_or(true);
        if !ok {
            return Err(down());
        }
        let mut inserted = self.inserted.lock().await;
        let base = inserted.len();
        let confirmed: Vec<InventoryRecord> = records
            .iter()
            .enumerate()
            .map(|(i, r)| InventoryRecord {
                id: format!("rec-{}", base + i + 1),
                session_id: r.session_id.clone(),
                site_id: r.site_id.clone(),
                user_id: None,
                inventory_type: r.inventory_type,
                sign_number: r.sign_number.clone(),
                description_id: r.description_id.clone(),
                quantity: r.quantity,
                notes: r.notes.clone(),
                created_at: Utc::now(),
            })
            .collect();
        inserted.extend(confirmed.iter().cloned());
        Ok(confirmed)
    }
}
