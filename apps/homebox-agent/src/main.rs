//! # Homebox Agent
//!
//! Long-running host for the Homebox sync engine.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Homebox Agent                                    │
//! │                                                                         │
//! │  load config (file ─► env ─► validate)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  coordinator.start()  ── first snapshot must succeed                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  poller + token refresher run ─► LoggingListener logs added/removed    │
//! │       │                                                                 │
//! │       ▼  Ctrl-C                                                         │
//! │  coordinator.shutdown()                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use homebox_core::NO_LOCATION_LABEL;
use homebox_sync::{HomeboxConfig, HomeboxCoordinator, InventoryListener, SyncError};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "homebox-agent", version, about = "Keeps a local Homebox inventory snapshot in sync")]
struct Cli {
    /// Path to homebox.toml (defaults to the platform config directory).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(long)]
    debug: bool,
}

/// Logs inventory lifecycle events.
struct LoggingListener;

impl InventoryListener for LoggingListener {
    fn on_items_added(&self, ids: &[String]) {
        info!(count = ids.len(), ids = ?ids, "Items added");
    }

    fn on_items_removed(&self, ids: &[String]) {
        info!(count = ids.len(), ids = ?ids, "Items removed");
    }

    fn on_update_failed(&self, error: &SyncError) {
        if error.is_auth_error() {
            error!("{}", error.user_message());
        }
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    info!("Starting Homebox agent...");

    let config = HomeboxConfig::load(cli.config).context("loading Homebox configuration")?;
    info!(
        url = %config.server.url,
        auth = %config.auth.method,
        update_interval_secs = config.sync.update_interval_secs,
        "Configuration loaded"
    );

    let coordinator = HomeboxCoordinator::with_listener(&config, Arc::new(LoggingListener))?;

    match coordinator.api().verify_connection().await {
        Ok(info) => info!(title = %info.title, "Connected"),
        Err(e) => warn!(error = %e, "Connection check failed"),
    }

    coordinator
        .start()
        .await
        .context("initial Homebox synchronization failed")?;

    let snapshot = coordinator.snapshot().await;
    let unplaced = snapshot
        .items()
        .keys()
        .filter(|id| snapshot.location_label(id) == NO_LOCATION_LABEL)
        .count();
    info!(
        items = snapshot.item_count(),
        locations = snapshot.location_count(),
        unplaced,
        "Inventory loaded"
    );

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;

    coordinator.shutdown().await;
    let status = coordinator.status().await;
    info!(
        last_update_success = status.last_update_success,
        consecutive_failures = status.consecutive_failures,
        "Homebox agent stopped"
    );
    Ok(())
}
