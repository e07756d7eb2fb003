//! Local durable store: connection handle, schema migrations and SQL repositories.
//!
//! This module is split into three submodules:
//! - `schema`: the ordered migration steps and the version-skew recovery path.
//! - `model`: row-shaped records returned by repositories.
//! - `repo`: SQL-only functions that map rows into domain types.
//!
//! Components never touch tables directly; they hold a cloned [`Store`] and go
//! through `repo`.

pub mod model;
pub mod repo;
pub mod schema;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, instrument, warn};

pub use model::{CatalogSnapshot, QueueRow};
pub use repo::*;
pub use schema::{MigrationOutcome, CURRENT_VERSION};

pub type Pool = SqlitePool;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("local storage unavailable: {0}")]
    StorageUnavailable(#[source] sqlx::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt {table} record: {source}")]
    Corrupt {
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared handle to the local database. Cheap to clone; every clone uses the
/// same single connection.
#[derive(Debug, Clone)]
pub struct Store {
    pool: Pool,
}

impl Store {
    /// Open (creating if needed) and migrate the store at `database_url`.
    ///
    /// A schema newer than [`CURRENT_VERSION`] is treated as unrecoverable skew:
    /// every table is dropped and the schema rebuilt from empty.
    #[instrument(skip_all)]
    pub async fn open(database_url: &str) -> Result<Self, StoreError> {
        let normalized = prepare_sqlite_url(database_url);
        let options = SqliteConnectOptions::from_str(&normalized)
            .map_err(StoreError::StorageUnavailable)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .foreign_keys(true);
        // One connection for the whole process; keep it alive so in-memory
        // databases are not dropped by the idle reaper.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StoreError::StorageUnavailable)?;

        let outcome = schema::migrate(&pool).await?;
        info!(
            from = outcome.from,
            to = outcome.to,
            recreated = outcome.recreated,
            "local store ready"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub async fn schema_version(&self) -> Result<i64, StoreError> {
        schema::user_version(&self.pool).await
    }

    /// Clear catalog snapshots and the sync queue together or not at all.
    pub async fn clear_caches(&self) -> Result<(), StoreError> {
        repo::clear_caches(&self.pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Delete the database file and its WAL side files. In-memory URLs are a no-op.
    ///
    /// Callers must close every open [`Store`] on this URL first.
    #[instrument(skip_all)]
    pub async fn reset(database_url: &str) -> Result<(), StoreError> {
        let Some(path) = database_path(&prepare_sqlite_url(database_url)) else {
            return Ok(());
        };
        for suffix in ["", "-wal", "-shm"] {
            let mut target = path.clone().into_os_string();
            target.push(suffix);
            match tokio::fs::remove_file(&target).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        warn!(path = %path.display(), "local store deleted");
        Ok(())
    }
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

/// File path behind a normalized `sqlite://` URL, or `None` for in-memory stores.
fn database_path(url: &str) -> Option<PathBuf> {
    let rest = url.strip_prefix("sqlite://")?;
    let path = rest.split_once('?').map(|(p, _)| p).unwrap_or(rest);
    if path.is_empty() || path.starts_with(":memory") {
        return None;
    }
    Some(PathBuf::from(path))
}
