//! Mailroute Receiver - spool queue drainer.
//!
//! This binary:
//! 1. Loads the routing table from the routes file
//! 2. Pops messages from the spool queue, oldest first
//! 3. Routes each one by its From/To headers
//!
//! Abandoned temp files in the spool are swept once at startup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mailroute::signal::shutdown_signal;
use mailroute::{load_router, Config, QueueReceiver, QueueStore};

/// Temp files older than this belong to a writer that died.
const STALE_TMP_AGE: Duration = Duration::from_secs(36 * 60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("receiver_starting");

    let config = Config::from_env();
    info!(
        routes_file = %config.routes_file.display(),
        spool_dir = %config.spool_dir.display(),
        poll_interval_ms = config.spool_poll_interval_ms,
        pop_limit = ?config.queue_pop_limit,
        oversize_dir = ?config.oversize_dir,
        "config_loaded"
    );

    let router = load_router(&config.routes_file, &config.undeliverable_dir)
        .with_context(|| format!("Failed to load routes from {}", config.routes_file.display()))?;

    let mut spool = QueueStore::open(&config.spool_dir).context("Failed to open spool")?;
    if let Some(limit) = config.queue_pop_limit {
        let oversize = config
            .oversize_dir
            .as_ref()
            .map(QueueStore::open)
            .transpose()
            .context("Failed to open oversize queue")?;
        spool = spool.with_pop_limit(limit, oversize);
    }

    let swept = spool
        .clean_stale(STALE_TMP_AGE)
        .context("Failed to sweep spool temp files")?;
    info!(removed = swept, "spool_tmp_swept");

    let receiver = QueueReceiver::new(
        Arc::new(router),
        spool,
        Duration::from_millis(config.spool_poll_interval_ms),
    );

    receiver
        .run(async {
            shutdown_signal().await;
            info!("receiver_stopping");
        })
        .await
}
