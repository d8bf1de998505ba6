//! ctrlplane workspace engine
//!
//! Reconciles the release targets of one workspace: evaluates policies,
//! dispatches jobs and verifies what was deployed.

use std::time::Duration;

use anyhow::Result;
use ctrlplane_workspace_engine::{config::Config, demo, WorkspaceEngine};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to CTRLPLANE_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting ctrlplane workspace engine");
    info!(
        workspace_id = %config.workspace_id,
        reconcile_interval_secs = config.reconcile_interval.as_secs(),
        dispatch_max_attempts = config.dispatch_max_attempts,
        "Configuration loaded"
    );

    let engine = WorkspaceEngine::new(config.clone())?;

    if config.dev_mode {
        info!("Seeding demo workspace (dev mode)");
        if let Err(e) = demo::seed(engine.store()) {
            error!(error = %e, "Failed to seed demo workspace");
            return Err(e.into());
        }
    }

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handles = engine.spawn(shutdown_rx)?;
    engine.boot().await;

    // Wait for shutdown signal (Ctrl+C)
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    // Signal shutdown to all workers
    let _ = shutdown_tx.send(true);

    info!("Waiting for workers to shut down...");
    let shutdown_timeout = Duration::from_secs(10);
    for handle in handles {
        if let Err(e) = tokio::time::timeout(shutdown_timeout, handle).await {
            warn!(error = %e, "Worker did not shut down in time");
        }
    }

    engine.shutdown().await;
    info!("Workspace engine shutdown complete");
    Ok(())
}
