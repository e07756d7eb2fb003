use super::model::{CatalogSnapshot, QueueRow};
use super::{Pool, StoreError};
use crate::model::{ActiveInventoryDraft, Area, QueuePayload, Scope, SignCatalogEntry, Site, SyncQueueItem};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use tracing::instrument;

fn to_json<T: Serialize + ?Sized>(table: &'static str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Corrupt { table, source })
}

fn from_json<T: DeserializeOwned>(table: &'static str, raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|source| StoreError::Corrupt { table, source })
}

// ---- catalog snapshots ----

#[instrument(skip_all)]
pub async fn put_catalog_snapshot(
    pool: &Pool,
    scope: &Scope,
    entries: &[SignCatalogEntry],
    cached_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    put_catalog_snapshot_tx(&mut tx, scope, entries, cached_at).await?;
    tx.commit().await?;
    Ok(())
}

async fn put_catalog_snapshot_tx(
    tx: &mut Transaction<'_, Sqlite>,
    scope: &Scope,
    entries: &[SignCatalogEntry],
    cached_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let encoded = to_json("catalog_snapshots", entries)?;
    sqlx::query(
        "INSERT OR REPLACE INTO catalog_snapshots (site_area_key, site_id, area_id, entries, cached_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(scope.catalog_key())
    .bind(&scope.site_id)
    .bind(scope.area_id())
    .bind(encoded)
    .bind(cached_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_catalog_snapshot(
    pool: &Pool,
    scope: &Scope,
) -> Result<Option<CatalogSnapshot>, StoreError> {
    let row = sqlx::query(
        "SELECT site_area_key, site_id, area_id, entries, cached_at FROM catalog_snapshots WHERE site_area_key = ?",
    )
    .bind(scope.catalog_key())
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let entries: String = row.try_get("entries")?;
    Ok(Some(CatalogSnapshot {
        key: row.try_get("site_area_key")?,
        site_id: row.try_get("site_id")?,
        area_id: row.try_get("area_id")?,
        entries: from_json("catalog_snapshots", &entries)?,
        cached_at: row.try_get("cached_at")?,
    }))
}

// ---- sites & areas ----

#[instrument(skip_all)]
pub async fn put_site(pool: &Pool, site: &Site, cached_at: DateTime<Utc>) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    put_site_tx(&mut tx, site, cached_at).await?;
    tx.commit().await?;
    Ok(())
}

async fn put_site_tx(
    tx: &mut Transaction<'_, Sqlite>,
    site: &Site,
    cached_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query("INSERT OR REPLACE INTO sites (id, name, location, cached_at) VALUES (?, ?, ?, ?)")
        .bind(&site.id)
        .bind(&site.name)
        .bind(&site.location)
        .bind(cached_at)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn list_sites(pool: &Pool) -> Result<Vec<Site>, StoreError> {
    let rows = sqlx::query("SELECT id, name, location FROM sites ORDER BY name ASC")
        .fetch_all(pool)
        .await?;
    rows.into_iter()
        .map(|row| {
            Ok(Site {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                location: row.try_get("location")?,
            })
        })
        .collect()
}

async fn put_area_tx(
    tx: &mut Transaction<'_, Sqlite>,
    area: &Area,
    cached_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query("INSERT OR REPLACE INTO areas (id, site_id, name, cached_at) VALUES (?, ?, ?, ?)")
        .bind(&area.id)
        .bind(&area.site_id)
        .bind(&area.name)
        .bind(cached_at)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Replace the cached area list of `site_id` with `areas`.
#[instrument(skip_all)]
pub async fn put_areas(
    pool: &Pool,
    site_id: &str,
    areas: &[Area],
    cached_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM areas WHERE site_id = ?")
        .bind(site_id)
        .execute(&mut *tx)
        .await?;
    for area in areas {
        put_area_tx(&mut tx, area, cached_at).await?;
    }
    tx.commit().await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn list_areas(pool: &Pool, site_id: &str) -> Result<Vec<Area>, StoreError> {
    // Served by idx_areas_site_id.
    let rows = sqlx::query("SELECT id, site_id, name FROM areas WHERE site_id = ? ORDER BY name ASC")
        .bind(site_id)
        .fetch_all(pool)
        .await?;
    rows.into_iter()
        .map(|row| {
            Ok(Area {
                id: row.try_get("id")?,
                site_id: row.try_get("site_id")?,
                name: row.try_get("name")?,
            })
        })
        .collect()
}

/// Stage a site, optionally one of its areas, and the matching catalog in one transaction.
#[instrument(skip_all)]
pub async fn stage_offline(
    pool: &Pool,
    site: &Site,
    area: Option<&Area>,
    entries: &[SignCatalogEntry],
    cached_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let scope = Scope {
        site_id: site.id.clone(),
        area_id: area.map(|a| a.id.clone()),
    };
    let mut tx = pool.begin().await?;
    put_site_tx(&mut tx, site, cached_at).await?;
    if let Some(area) = area {
        put_area_tx(&mut tx, area, cached_at).await?;
    }
    put_catalog_snapshot_tx(&mut tx, &scope, entries, cached_at).await?;
    tx.commit().await?;
    Ok(())
}

// ---- drafts ----

fn draft_from_row(row: &SqliteRow) -> Result<ActiveInventoryDraft, StoreError> {
    let signs: String = row.try_get("signs")?;
    Ok(ActiveInventoryDraft {
        key: row.try_get("draft_key")?,
        site_id: row.try_get("site_id")?,
        area_id: row.try_get("area_id")?,
        site_name: row.try_get("site_name")?,
        area_name: row.try_get("area_name")?,
        signs: from_json("active_drafts", &signs)?,
        created_at: row.try_get("created_at")?,
        last_modified: row.try_get("last_modified")?,
    })
}

/// Replace the draft stored under `draft.key`, keeping the original `created_at`.
/// Returns the draft as stored.
#[instrument(skip_all)]
pub async fn put_draft(
    pool: &Pool,
    draft: &ActiveInventoryDraft,
) -> Result<ActiveInventoryDraft, StoreError> {
    let signs = to_json("active_drafts", &draft.signs)?;
    let row = sqlx::query(
        "INSERT INTO active_drafts (draft_key, site_id, area_id, site_name, area_name, signs, created_at, last_modified) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(draft_key) DO UPDATE SET \
            site_id = excluded.site_id, \
            area_id = excluded.area_id, \
            site_name = excluded.site_name, \
            area_name = excluded.area_name, \
            signs = excluded.signs, \
            last_modified = excluded.last_modified \
         RETURNING draft_key, site_id, area_id, site_name, area_name, signs, created_at, last_modified",
    )
    .bind(&draft.key)
    .bind(&draft.site_id)
    .bind(&draft.area_id)
    .bind(&draft.site_name)
    .bind(&draft.area_name)
    .bind(signs)
    .bind(draft.created_at)
    .bind(draft.last_modified)
    .fetch_one(pool)
    .await?;
    draft_from_row(&row)
}

#[instrument(skip_all)]
pub async fn get_draft(pool: &Pool, key: &str) -> Result<Option<ActiveInventoryDraft>, StoreError> {
    let row = sqlx::query(
        "SELECT draft_key, site_id, area_id, site_name, area_name, signs, created_at, last_modified FROM active_drafts WHERE draft_key = ?",
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(draft_from_row).transpose()
}

/// Returns whether a draft was removed.
#[instrument(skip_all)]
pub async fn delete_draft(pool: &Pool, key: &str) -> Result<bool, StoreError> {
    let res = sqlx::query("DELETE FROM active_drafts WHERE draft_key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn list_drafts(pool: &Pool) -> Result<Vec<ActiveInventoryDraft>, StoreError> {
    let rows = sqlx::query(
        "SELECT draft_key, site_id, area_id, site_name, area_name, signs, created_at, last_modified FROM active_drafts ORDER BY last_modified DESC",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(draft_from_row).collect()
}

#[instrument(skip_all)]
pub async fn count_drafts(pool: &Pool) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM active_drafts")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

// ---- sync queue ----

#[instrument(skip_all)]
pub async fn enqueue(
    pool: &Pool,
    payload: &QueuePayload,
    enqueued_at: DateTime<Utc>,
) -> Result<i64, StoreError> {
    let encoded = to_json("sync_queue", payload)?;
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO sync_queue (kind, payload, enqueued_at) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(payload.kind().as_str())
    .bind(encoded)
    .bind(enqueued_at)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// All queued rows in enqueue order.
#[instrument(skip_all)]
pub async fn list_queue_rows(pool: &Pool) -> Result<Vec<QueueRow>, StoreError> {
    let rows = sqlx::query("SELECT id, kind, payload, enqueued_at FROM sync_queue ORDER BY id ASC")
        .fetch_all(pool)
        .await?;
    rows.into_iter()
        .map(|row| {
            Ok(QueueRow {
                id: row.try_get("id")?,
                kind: row.try_get("kind")?,
                payload: row.try_get("payload")?,
                enqueued_at: row.try_get("enqueued_at")?,
            })
        })
        .collect()
}

/// Decoded queue in enqueue order. Fails on the first corrupt payload.
pub async fn list_queue(pool: &Pool) -> Result<Vec<SyncQueueItem>, StoreError> {
    list_queue_rows(pool)
        .await?
        .iter()
        .map(QueueRow::decode)
        .collect()
}

/// Returns whether the item was still present.
#[instrument(skip_all)]
pub async fn delete_queue_item(pool: &Pool, id: i64) -> Result<bool, StoreError> {
    let res = sqlx::query("DELETE FROM sync_queue WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn count_queue(pool: &Pool) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[instrument(skip_all)]
pub async fn clear_caches(pool: &Pool) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM catalog_snapshots")
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM sync_queue")
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}
