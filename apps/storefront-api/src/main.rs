//! # Storefront API
//!
//! Background runner for the storefront: opens the database, builds the
//! configured payment providers and keeps the payment sweeper running until
//! shutdown.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  env ──► AppConfig ──► Database (SQLite, migrations)                    │
//! │                    └─► ProviderRegistry + Notifier                      │
//! │                                 │                                       │
//! │                                 ▼                                       │
//! │                      PaymentSweeper (spawned)                           │
//! │                                 │                                       │
//! │               Ctrl+C / SIGTERM ─┴─► shutdown, close pool                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use storefront_api::services::sweeper::PaymentSweeper;
use storefront_api::{AppConfig, AppState};
use storefront_db::Database;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("Starting storefront API...");

    let config = AppConfig::load()?;
    info!(
        database = %config.database_path.display(),
        policy = ?config.inventory_policy,
        sweep_interval_secs = config.sweep_interval_secs,
        "Configuration loaded"
    );

    let db = Database::new(config.db_config()).await?;
    info!("Database ready");

    let state = Arc::new(AppState::from_config(db.clone(), config)?);
    info!(methods = ?state.providers.methods(), "Payment providers configured");

    let (sweeper, sweeper_handle) = PaymentSweeper::new(state.clone());
    let sweeper_task = tokio::spawn(sweeper.run());

    shutdown_signal().await;

    sweeper_handle.shutdown().await;
    if let Err(e) = sweeper_task.await {
        error!(error = %e, "Sweeper task panicked");
    }

    db.close().await;
    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
