//! snapex-server binary entry point.
//!
//! Loads configuration, restores the job registry, seeds templates, starts
//! the mount reconciliation loop and serves the REST API until Ctrl+C.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;

use snapex::config::{default_config, load_config};
use snapex::{Database, ReconcileScheduler};
use snapex_server::{create_router, telemetry, AppState};

#[derive(Parser)]
#[command(name = "snapex-server")]
#[command(version)]
#[command(about = "Extraction jobs over mounted backup snapshots")]
struct Cli {
    /// Path to a JSON configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind, overriding `server.bind`
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => default_config().context("Invalid default configuration")?,
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    telemetry::init(&config.logging)?;
    tracing::info!("snapex-server v{} starting", env!("CARGO_PKG_VERSION"));

    let db = Database::open(&config.database_path).context("Failed to open database")?;
    let state = AppState::bootstrap(&config, db).context("Failed to initialize engine")?;
    tracing::info!(
        backups = config.mounts.directories.len(),
        output = %config.output_directory.display(),
        "Engine ready"
    );

    let scheduler = ReconcileScheduler::new(
        state.reconciler.clone(),
        config.mounts.reconcile_interval(),
    );
    let scheduler_task = scheduler.start(state.reconcile_trigger.subscribe());

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    let registry = state.registry.clone();
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down");
    scheduler.stop();
    if let Err(e) = scheduler_task.await {
        tracing::warn!("Reconcile scheduler task ended abnormally: {}", e);
    }
    registry.persist_all().context("Failed to persist jobs")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
