use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use sign_inventory_sync::config;
use sign_inventory_sync::db::Store;
use sign_inventory_sync::drafts::DraftManager;
use sign_inventory_sync::outbox::SyncQueue;

#[derive(Debug, Parser)]
#[command(author, version, about = "Inspect or reset the local inventory store")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print schema version, resident drafts and queued saves
    Status,
    /// Empty the catalog cache and the sync queue; drafts are kept
    ClearCaches,
    /// Delete the database file entirely
    Reset,
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
    let url = cfg.database_url();

    match args.command {
        Command::Status => {
            let store = Store::open(&url).await?;
            let drafts = DraftManager::new(store.clone());
            let queue = SyncQueue::new(store.clone());
            info!(
                schema_version = store.schema_version().await?,
                drafts = drafts.draft_count().await?,
                queued = queue.count().await?,
                "store status"
            );
            for draft in drafts.list_drafts().await? {
                println!(
                    "draft {}\t{} marked\tlast modified {}",
                    draft.key,
                    draft.marked().count(),
                    draft.last_modified.to_rfc3339()
                );
            }
            for item in queue.items().await? {
                println!(
                    "queued #{}\t{}\t{} record(s)\tsince {}",
                    item.id,
                    item.payload.kind().as_str(),
                    item.payload.len(),
                    item.enqueued_at.to_rfc3339()
                );
            }
            store.close().await;
        }
        Command::ClearCaches => {
            let store = Store::open(&url).await?;
            store.clear_caches().await?;
            store.close().await;
            info!("caches cleared");
        }
        Command::Reset => {
            Store::reset(&url).await?;
        }
    }
    Ok(())
}
