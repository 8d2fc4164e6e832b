//! # Marker Sweep Server
//!
//! Loads configuration, bootstraps the engine against PostgreSQL and serves
//! the trigger endpoint until interrupted.

use anyhow::Context;
use marker_sweep::bootstrap::SweepSystem;
use marker_sweep::config::ConfigManager;
use marker_sweep::logging;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config_manager = ConfigManager::load().context("loading configuration")?;
    let bind_address = config_manager.config().web.socket_addr()?;

    let system = SweepSystem::bootstrap(config_manager)
        .await
        .context("bootstrapping sweep system")?;

    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;
    info!(address = %bind_address, "Listening for update run triggers");

    axum::serve(listener, system.router())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    system.shutdown().await?;
    info!("Marker sweep stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}
