use anyhow::{Context, Result, bail};
use std::sync::Arc;
use symbol_library_sync::config::{SyncConfig, ambient_username};
use symbol_library_sync::services::{HttpRemoteService, LibraryService, RemoteService};
use symbol_library_sync::storage::{LocalStore, TimestampLedger};
use tracing::info;

// One-shot startup sync: seed defaults, reconcile the library blob, then sync
// both collections for the user given as first argument or LIBRARY_SYNC_USERNAME.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    // RUST_LOG environment variable controls log level (default: info)
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = SyncConfig::from_env();
    let Some(username) = std::env::args().nth(1).or_else(ambient_username) else {
        bail!("No username given: pass it as the first argument or set LIBRARY_SYNC_USERNAME");
    };

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", config.data_dir))?;
    let store = LocalStore::open(&config.database_path())
        .with_context(|| format!("Failed to open local store in {:?}", config.data_dir))?;
    let ledger = Arc::new(TimestampLedger::open(config.ledger_path()));
    let remote: Arc<dyn RemoteService> = Arc::new(
        HttpRemoteService::new(&config).context("Failed to set up the remote service client")?,
    );

    info!(
        "Syncing library for {} against {} (data in {:?})",
        username, config.remote_url, config.data_dir
    );
    let service = LibraryService::new(&config, store, ledger, remote);
    let summary = service.startup(&username).await;

    info!(
        "Startup sync finished: library {:?}, {} defaults seeded",
        summary.library, summary.seeded
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
