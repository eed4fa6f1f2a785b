//! crm-pipeline - Lead and sales pipeline service
//!
//! Serves the lead and pipeline REST API on port 5730 by default and keeps
//! the per-stage aggregates in step with lead changes.

use anyhow::{Context, Result};
use clap::Parser;
use crm_common::config::{ConfigOverrides, ServiceConfig};
use crm_common::events::EventBus;
use crm_pipeline::services::scheduler::spawn_recalculation_task;
use crm_pipeline::{build_router, AppState, EVENT_BUS_CAPACITY, MODULE_NAME};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};

/// Command-line arguments for crm-pipeline
#[derive(Parser, Debug)]
#[command(name = "crm-pipeline")]
#[command(about = "Lead management and sales pipeline reconciliation service")]
#[command(version)]
struct Args {
    /// TOML config file (default: <config dir>/crm/config.toml, if present)
    #[arg(short, long, env = "CRM_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the database
    #[arg(short, long, env = "CRM_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "CRM_BIND")]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "CRM_PORT")]
    port: Option<u16>,

    /// Log filter, e.g. "info" or "crm_pipeline=debug"
    #[arg(long, env = "CRM_LOG_LEVEL")]
    log_level: Option<String>,

    /// Seconds between scheduled conversion-rate recalculations (0 disables)
    #[arg(long, env = "CRM_RECALC_INTERVAL_SECS")]
    recalc_interval_secs: Option<u64>,
}

impl From<Args> for ConfigOverrides {
    fn from(args: Args) -> Self {
        Self {
            config_file: args.config,
            root_folder: args.root_folder,
            bind: args.bind,
            port: args.port,
            log_level: args.log_level,
            recalc_interval_secs: args.recalc_interval_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ServiceConfig::resolve(args.into()).context("Failed to load configuration")?;

    // RUST_LOG takes precedence over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    // Log build identification immediately, before any database delay
    info!(
        "Starting {} v{} [{}] built {} ({})",
        MODULE_NAME,
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    config
        .ensure_root_folder()
        .context("Failed to create root folder")?;

    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());

    let pool = match crm_common::db::init_database(&db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    let events = EventBus::new(EVENT_BUS_CAPACITY);
    let state = AppState::new(pool, events);

    let _recalc_task = config
        .recalc_interval
        .map(|period| spawn_recalculation_task(state.reconciler.clone(), period));

    let app = build_router(state);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    info!("{} listening on http://{}", MODULE_NAME, bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
