use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use sign_inventory_sync::config;
use sign_inventory_sync::connectivity::{ConnectivityMonitor, SyncTrigger};
use sign_inventory_sync::db::Store;
use sign_inventory_sync::outbox::SyncQueue;
use sign_inventory_sync::remote::HttpRemote;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Replay every queued inventory save once and exit"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Exit with an error if any item is still queued after the pass
    #[arg(long)]
    fail_on_pending: bool,
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

    let store = Store::open(&cfg.database_url()).await?;
    let queue = SyncQueue::new(store.clone());
    let remaining = queue.count().await?;
    info!(remaining, "initial sync state");
    if remaining == 0 {
        info!("nothing queued, exiting");
        return Ok(());
    }

    let remote = Arc::new(HttpRemote::from_config(&cfg)?);
    let monitor = ConnectivityMonitor::new(true, queue, remote);
    let report = monitor.sync_now(SyncTrigger::BackgroundSync).await?;
    store.close().await;

    info!(
        synced = report.synced.len(),
        failed = report.failed.len(),
        remaining = report.remaining,
        "sync pass complete"
    );
    if report.remaining > 0 {
        warn!(ids = ?report.failed, "items remain queued");
        if args.fail_on_pending {
            bail!("{} queued item(s) could not be synced", report.remaining);
        }
    }
    Ok(())
}
