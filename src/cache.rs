//! Read-through caches for catalog, site and area reference data.
//!
//! Catalog snapshots expire after the configured TTL and are then treated as
//! absent (the row stays until the next write overwrites it). Sites and areas
//! never expire.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument};

use crate::db::{self, Store, StoreError};
use crate::model::{Area, Scope, SignCatalogEntry, Site};

pub const DEFAULT_CATALOG_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct CacheManager {
    store: Store,
    ttl: Duration,
}

/// A snapshot taken at `cached_at` is usable at `now` while younger than `ttl`.
pub fn is_fresh(cached_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    now - cached_at < ttl
}

impl CacheManager {
    pub fn new(store: Store, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn with_default_ttl(store: Store) -> Self {
        Self::new(store, Duration::hours(DEFAULT_CATALOG_TTL_HOURS))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn cache_catalog(
        &self,
        scope: &Scope,
        entries: &[SignCatalogEntry],
    ) -> Result<(), StoreError> {
        self.cache_catalog_at(scope, entries, Utc::now()).await
    }

    #[instrument(skip_all, fields(key = %scope.catalog_key()))]
    pub async fn cache_catalog_at(
        &self,
        scope: &Scope,
        entries: &[SignCatalogEntry],
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        db::put_catalog_snapshot(self.store.pool(), scope, entries, now).await?;
        debug!(entries = entries.len(), "catalog cached");
        Ok(())
    }

    pub async fn get_cached_catalog(
        &self,
        scope: &Scope,
    ) -> Result<Option<Vec<SignCatalogEntry>>, StoreError> {
        self.get_cached_catalog_at(scope, Utc::now()).await
    }

    /// Entries for `scope` if a snapshot exists and has not expired at `now`.
    #[instrument(skip_all, fields(key = %scope.catalog_key()))]
    pub async fn get_cached_catalog_at(
        &self,
        scope: &Scope,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<SignCatalogEntry>>, StoreError> {
        match db::get_catalog_snapshot(self.store.pool(), scope).await? {
            Some(snapshot) if is_fresh(snapshot.cached_at, now, self.ttl) => {
                debug!(entries = snapshot.entries.len(), "catalog cache hit");
                Ok(Some(snapshot.entries))
            }
            Some(_) => {
                debug!("catalog cache expired");
                Ok(None)
            }
            None => {
                debug!("catalog cache miss");
                Ok(None)
            }
        }
    }

    pub async fn cache_site(&self, site: &Site) -> Result<(), StoreError> {
        db::put_site(self.store.pool(), site, Utc::now()).await
    }

    pub async fn get_cached_sites(&self) -> Result<Vec<Site>, StoreError> {
        db::list_sites(self.store.pool()).await
    }

    /// Replace the cached areas of `site_id`.
    pub async fn cache_areas(&self, site_id: &str, areas: &[Area]) -> Result<(), StoreError> {
        db::put_areas(self.store.pool(), site_id, areas, Utc::now()).await
    }

    pub async fn get_cached_areas(&self, site_id: &str) -> Result<Vec<Area>, StoreError> {
        db::list_areas(self.store.pool(), site_id).await
    }

    pub async fn is_downloaded(&self, scope: &Scope) -> Result<bool, StoreError> {
        self.is_downloaded_at(scope, Utc::now()).await
    }

    /// True iff a fresh, non-empty snapshot exists for `scope`.
    pub async fn is_downloaded_at(
        &self,
        scope: &Scope,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self
            .get_cached_catalog_at(scope, now)
            .await?
            .is_some_and(|entries| !entries.is_empty()))
    }

    /// Stage a site, its area and the catalog for offline use as one unit.
    #[instrument(skip_all, fields(site = %site.id))]
    pub async fn download_for_offline(
        &self,
        site: &Site,
        area: Option<&Area>,
        entries: &[SignCatalogEntry],
    ) -> Result<(), StoreError> {
        db::stage_offline(self.store.pool(), site, area, entries, Utc::now()).await?;
        info!(
            area = area.map(|a| a.id.as_str()).unwrap_or("ALL"),
            entries = entries.len(),
            "staged for offline use"
        );
        Ok(())
    }
}
