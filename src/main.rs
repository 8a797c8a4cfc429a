//! Emberfall Game Server
//!
//! Hosts the server-side game-state services for an Emberfall world:
//! loot, resources, messages, profiles and combat, persisted to
//! PostgreSQL when available.

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use emberfall_server::config::ServerConfig;
use emberfall_server::state::AppState;
use emberfall_server::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first: its debug flag gates the default log level
    let config = ServerConfig::load().await?;
    init_logging(config.debug);

    info!("Emberfall Game Server v{}", VERSION);
    info!(
        "Configuration loaded from: {}",
        config.config_path.display()
    );

    // Try to create database pool for player persistence
    let db_pool = create_database_pool(&config).await;

    // Initialize application state (with or without persistence)
    let state = match db_pool {
        Some(pool) => {
            info!("Initializing application state with database persistence");
            let store = emberfall_server::game::persistence::PostgresStore::new(pool.clone());
            store.ensure_schema().await?;
            Arc::new(AppState::with_persistence(config.clone(), pool))
        }
        None => {
            warn!("Initializing application state without database persistence");
            Arc::new(AppState::new(config.clone()))
        }
    };
    info!("Application state initialized");

    // Start the background expiry sweepers
    state.spawn_sweepers();

    info!("Server startup complete!");
    info!("World {} is ready", config.world_id);

    // Wait for shutdown signal
    wait_for_shutdown(state.shutdown_tx.clone()).await;

    info!("Shutting down server...");

    // Flush every online player's profile before exit
    let saved = state.save_all().await;
    if saved > 0 {
        info!("Saved {} player profiles on shutdown", saved);
    }

    info!("Server shutdown complete. Goodbye!");
    Ok(())
}

/// Initialize the logging/tracing system; `RUST_LOG` wins over the
/// config-driven default
fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(debug)));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();
}

/// Default log filter when `RUST_LOG` is unset
fn default_log_filter(debug: bool) -> &'static str {
    if debug {
        "debug,emberfall_server=trace"
    } else {
        "info,emberfall_server=debug"
    }
}

/// Create database pool for player persistence
async fn create_database_pool(config: &ServerConfig) -> Option<sqlx::PgPool> {
    match PgPoolOptions::new()
        .max_connections(config.database.pool_size)
        .connect(&config.database_url())
        .await
    {
        Ok(pool) => {
            info!("Database pool created for player persistence");
            Some(pool)
        }
        Err(e) => {
            warn!(
                "Failed to create database pool: {}. Player persistence disabled.",
                e
            );
            None
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Signal all tasks to shut down
    let _ = shutdown_tx.send(());
}
