use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use sign_inventory_sync::config;
use sign_inventory_sync::connectivity::{probe_stream, ConnectivityMonitor, NoBackgroundSync, SyncTrigger};
use sign_inventory_sync::db::Store;
use sign_inventory_sync::outbox::SyncQueue;
use sign_inventory_sync::remote::{HttpRemote, RemoteService};

#[derive(Debug, Parser)]
#[command(author, version, about = "Watch connectivity and replay queued inventory saves")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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
    let http = HttpRemote::from_config(&cfg)?;
    let remote: Arc<dyn RemoteService> = Arc::new(http.clone());
    let queue = SyncQueue::new(store.clone());

    let initial = cfg.connectivity.start_online;
    let monitor = ConnectivityMonitor::new(initial, queue.clone(), remote);
    monitor.register_background_sync(&NoBackgroundSync).await;

    let pending = queue.count().await?;
    info!(pending, online = initial, "starting sync daemon");
    if initial && pending > 0 {
        if let Err(err) = monitor.sync_now(SyncTrigger::ConnectivityRestored).await {
            error!(?err, "initial drain failed");
        }
    }

    let events = probe_stream(cfg.probe_interval(), initial, move || {
        let http = http.clone();
        async move { http.probe().await.is_ok() }
    });

    tokio::select! {
        _ = monitor.run(events) => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(err) = res {
                error!(?err, "failed to listen for shutdown signal");
            }
            info!("shutting down");
        }
    }

    store.close().await;
    Ok(())
}
