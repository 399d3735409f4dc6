//! Mailroute Web Server - HTTP intake transport.
//!
//! Loads the routing table from the routes file, then accepts messages on
//! `POST /deliver` and hands each one to the router. Messages that resolve
//! nowhere land in the undeliverable queue.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mailroute::signal::shutdown_signal;
use mailroute::web::{app, signing_enabled, AppState};
use mailroute::{load_router, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    let config = Config::from_env();
    info!(
        port = config.port,
        routes_file = %config.routes_file.display(),
        undeliverable_dir = %config.undeliverable_dir.display(),
        intake_signing_configured = signing_enabled(config.intake_signing_key.as_deref()),
        "config_loaded"
    );

    let router = load_router(&config.routes_file, &config.undeliverable_dir)
        .with_context(|| format!("Failed to load routes from {}", config.routes_file.display()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(config, Arc::new(router));

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("web_server_shutting_down");
        })
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}
