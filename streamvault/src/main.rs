//! streamvault - Twitch EventSub stream recorder.
//!
//! Ingests EventSub webhooks, supervises streamlink captures, and runs
//! the durable post-processing pipeline that turns raw captures into
//! media-server-ready episodes.

use std::sync::Arc;

use streamvault::database;
use streamvault::logging::init_logging;
use streamvault::services::ServiceContainer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
    let (logging_config, _guard) = init_logging(&log_dir)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Starting streamvault v{}", env!("CARGO_PKG_VERSION"));

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:streamvault.db?mode=rwc".to_string());
    info!("Connecting to database: {}", database_url);
    let pool = database::init_pool(&database_url).await?;

    let container = ServiceContainer::new(pool, log_dir.into()).await?;

    container.apply_persisted_log_filter(&logging_config).await;
    logging_config.start_retention_cleanup(container.cancellation_token());

    // Recovery runs here, before the webhook endpoint opens.
    container.initialize().await?;
    container.start_api_server().await?;

    info!("streamvault started successfully");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), initiating shutdown...");
        }
        _ = wait_for_sigterm() => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    if let Err(e) = container.shutdown().await {
        error!("Error during shutdown: {}", e);
    }

    info!("streamvault shutdown complete");
    Ok(())
}

/// Wait for SIGTERM (Unix only).
#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
    sigterm.recv().await;
}

/// On non-Unix targets only Ctrl+C is handled.
#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}
