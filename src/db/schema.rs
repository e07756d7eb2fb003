//! Forward-only schema migrations keyed on `PRAGMA user_version`.

use super::{Pool, StoreError};
use sqlx::Row;
use tracing::{info, instrument, warn};

/// Schema version this build writes and understands.
pub const CURRENT_VERSION: i64 = 4;

/// What a migration step does to one table.
#[derive(Debug, Clone, Copy)]
pub enum TableAction {
    /// Create if absent; existing rows are kept.
    Preserve {
        table: &'static str,
        ddl: &'static [&'static str],
    },
    /// Drop and create; existing rows are lost.
    Recreate {
        table: &'static str,
        ddl: &'static [&'static str],
    },
}

#[derive(Debug, Clone, Copy)]
pub struct MigrationStep {
    pub from: i64,
    pub to: i64,
    pub actions: &'static [TableAction],
}

/// Applied in order. Each step runs in one transaction with its version bump.
pub const MIGRATIONS: &[MigrationStep] = &[
    MigrationStep {
        from: 0,
        to: 1,
        actions: &[
            TableAction::Preserve {
                table: "catalog_snapshots",
                ddl: &["CREATE TABLE IF NOT EXISTS catalog_snapshots (
                    site_id TEXT PRIMARY KEY,
                    signs TEXT NOT NULL,
                    cached_at TEXT NOT NULL
                )"],
            },
            TableAction::Preserve {
                table: "sync_queue",
                ddl: &["CREATE TABLE IF NOT EXISTS sync_queue (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    kind TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    enqueued_at TEXT NOT NULL
                )"],
            },
        ],
    },
    MigrationStep {
        from: 1,
        to: 2,
        actions: &[TableAction::Preserve {
            table: "active_drafts",
            ddl: &[
                "CREATE TABLE IF NOT EXISTS active_drafts (
                    draft_key TEXT PRIMARY KEY,
                    site_id TEXT NOT NULL,
                    area_id TEXT,
                    site_name TEXT,
                    area_name TEXT,
                    signs TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    last_modified TEXT NOT NULL
                )",
                "CREATE INDEX IF NOT EXISTS idx_active_drafts_site_id ON active_drafts (site_id)",
                "CREATE INDEX IF NOT EXISTS idx_active_drafts_last_modified ON active_drafts (last_modified)",
            ],
        }],
    },
    MigrationStep {
        from: 2,
        to: 3,
        actions: &[
            TableAction::Preserve {
                table: "sites",
                ddl: &["CREATE TABLE IF NOT EXISTS sites (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    location TEXT,
                    cached_at TEXT NOT NULL
                )"],
            },
            TableAction::Preserve {
                table: "areas",
                ddl: &[
                    "CREATE TABLE IF NOT EXISTS areas (
                        id TEXT PRIMARY KEY,
                        site_id TEXT NOT NULL,
                        name TEXT NOT NULL,
                        cached_at TEXT NOT NULL
                    )",
                    "CREATE INDEX IF NOT EXISTS idx_areas_site_id ON areas (site_id)",
                ],
            },
        ],
    },
    MigrationStep {
        from: 3,
        to: 4,
        actions: &[TableAction::Recreate {
            table: "catalog_snapshots",
            ddl: &[
                "CREATE TABLE catalog_snapshots (
                    site_area_key TEXT PRIMARY KEY,
                    site_id TEXT NOT NULL,
                    area_id TEXT,
                    entries TEXT NOT NULL,
                    cached_at TEXT NOT NULL
                )",
                "CREATE INDEX IF NOT EXISTS idx_catalog_snapshots_site_id ON catalog_snapshots (site_id)",
            ],
        }],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub from: i64,
    pub to: i64,
    /// The store was wiped because it carried an unknown newer version.
    pub recreated: bool,
}

pub async fn user_version(pool: &Pool) -> Result<i64, StoreError> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;
    Ok(version)
}

#[instrument(skip_all)]
pub async fn migrate(pool: &Pool) -> Result<MigrationOutcome, StoreError> {
    let found = user_version(pool).await?;
    let mut version = found;
    let mut recreated = false;

    if version > CURRENT_VERSION {
        warn!(
            found = version,
            supported = CURRENT_VERSION,
            "schema version conflict; destroying and recreating local store"
        );
        destroy(pool).await?;
        version = 0;
        recreated = true;
    }

    let start = version;
    for step in MIGRATIONS.iter().filter(|s| s.from >= start) {
        apply_step(pool, step).await?;
        version = step.to;
    }

    Ok(MigrationOutcome {
        from: found,
        to: version,
        recreated,
    })
}

async fn apply_step(pool: &Pool, step: &MigrationStep) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    for action in step.actions {
        match action {
            TableAction::Preserve { ddl, .. } => {
                for stmt in *ddl {
                    sqlx::query(stmt).execute(&mut *tx).await?;
                }
            }
            TableAction::Recreate { table, ddl } => {
                sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                    .execute(&mut *tx)
                    .await?;
                for stmt in *ddl {
                    sqlx::query(stmt).execute(&mut *tx).await?;
                }
            }
        }
    }
    // PRAGMA does not take bind parameters.
    sqlx::query(&format!("PRAGMA user_version = {}", step.to))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!(from = step.from, to = step.to, "applied schema migration");
    Ok(())
}

/// Drop every user table and reset the version to zero.
async fn destroy(pool: &Pool) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    let tables: Vec<String> = sqlx::query(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .map(|row| row.get::<String, _>("name"))
    .collect();
    for table in tables {
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", table.replace('"', "\"\"")))
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("PRAGMA user_version = 0")
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    async fn raw_pool() -> Pool {
        sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn table_names(pool: &SqlitePool) -> Vec<String> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .unwrap()
    }

    #[test]
    fn steps_are_contiguous_and_end_at_current() {
        let mut expected_from = 0;
        for step in MIGRATIONS {
            assert_eq!(step.from, expected_from);
            assert_eq!(step.to, step.from + 1);
            expected_from = step.to;
        }
        assert_eq!(expected_from, CURRENT_VERSION);
    }

    #[tokio::test]
    async fn fresh_database_reaches_current_version() {
        let pool = raw_pool().await;
        let outcome = migrate(&pool).await.unwrap();
        assert_eq!(
            outcome,
            MigrationOutcome {
                from: 0,
                to: CURRENT_VERSION,
                recreated: false
            }
        );
        assert_eq!(
            table_names(&pool).await,
            vec![
                "active_drafts",
                "areas",
                "catalog_snapshots",
                "sites",
                "sync_queue"
            ]
        );
        // Running again is a no-op.
        let outcome = migrate(&pool).await.unwrap();
        assert_eq!(outcome.from, CURRENT_VERSION);
        assert_eq!(outcome.to, CURRENT_VERSION);
    }

    #[tokio::test]
    async fn upgrade_from_v1_drops_old_snapshots_but_keeps_queue() {
        let pool = raw_pool().await;
        apply_step(&pool, &MIGRATIONS[0]).await.unwrap();
        sqlx::query("INSERT INTO catalog_snapshots (site_id, signs, cached_at) VALUES ('s1', '[]', '2024-01-01')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO sync_queue (kind, payload, enqueued_at) VALUES ('inventory_records', '{}', '2024-01-01')")
            .execute(&pool)
            .await
            .unwrap();

        let outcome = migrate(&pool).await.unwrap();
        assert_eq!(outcome.from, 1);
        assert!(!outcome.recreated);

        let snapshots: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_snapshots")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(snapshots, 0);
        let queued: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(queued, 1);

        // The new composite-key column exists.
        sqlx::query("SELECT site_area_key FROM catalog_snapshots")
            .fetch_all(&pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn newer_version_is_destroyed_and_recreated() {
        let pool = raw_pool().await;
        migrate(&pool).await.unwrap();
        sqlx::query("INSERT INTO sync_queue (kind, payload, enqueued_at) VALUES ('inventory_records', '{}', '2024-01-01')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE future_table (id INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("PRAGMA user_version = 99")
            .execute(&pool)
            .await
            .unwrap();

        let outcome = migrate(&pool).await.unwrap();
        assert!(outcome.recreated);
        assert_eq!(outcome.from, 99);
        assert_eq!(outcome.to, CURRENT_VERSION);
        assert_eq!(user_version(&pool).await.unwrap(), CURRENT_VERSION);
        assert!(!table_names(&pool).await.contains(&"future_table".to_string()));

        let queued: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(queued, 0);
    }
}
