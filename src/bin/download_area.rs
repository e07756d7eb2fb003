use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use sign_inventory_sync::cache::CacheManager;
use sign_inventory_sync::config;
use sign_inventory_sync::db::Store;
use sign_inventory_sync::model::Scope;
use sign_inventory_sync::remote::{CatalogSort, HttpRemote, RemoteService};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Sort {
    SignNumber,
    SignTypeCode,
    Description,
}

impl From<Sort> for CatalogSort {
    fn from(sort: Sort) -> Self {
        match sort {
            Sort::SignNumber => CatalogSort::SignNumber,
            Sort::SignTypeCode => CatalogSort::SignTypeCode,
            Sort::Description => CatalogSort::Description,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Download a site's (or one area's) sign catalog for offline use"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Site id
    #[arg(long)]
    site: String,

    /// Area id; the whole site when omitted
    #[arg(long)]
    area: Option<String>,

    #[arg(long, value_enum, default_value = "sign-number")]
    sort: Sort,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let remote = HttpRemote::from_config(&cfg)?;
    let site = remote
        .fetch_sites()
        .await?
        .into_iter()
        .find(|s| s.id == args.site)
        .ok_or_else(|| anyhow!("site {} not found", args.site))?;

    let area = match &args.area {
        Some(area_id) => Some(
            remote
                .fetch_areas(&site.id)
                .await?
                .into_iter()
                .find(|a| &a.id == area_id)
                .ok_or_else(|| anyhow!("area {} not found in site {}", area_id, site.id))?,
        ),
        None => None,
    };

    let scope = Scope::new(site.id.clone(), area.as_ref().map(|a| a.id.clone()));
    let mut entries = remote
        .fetch_catalog(&site.id, area.as_ref().map(|a| a.name.as_str()), args.sort.into())
        .await?;
    for entry in entries.iter_mut() {
        if entry.area_id.is_none() {
            entry.area_id = scope.area_id.clone();
        }
    }

    let store = Store::open(&cfg.database_url()).await?;
    let cache = CacheManager::new(store.clone(), cfg.cache_ttl());
    cache
        .download_for_offline(&site, area.as_ref(), &entries)
        .await?;
    let downloaded = cache.is_downloaded(&scope).await?;
    store.close().await;

    info!(
        key = %scope.catalog_key(),
        entries = entries.len(),
        downloaded,
        "offline download complete"
    );
    Ok(())
}
