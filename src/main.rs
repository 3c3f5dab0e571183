//! Fleet Dashboard Core
//!
//! Serves the local dashboard API over the remote fleet API, keeping the
//! operator's driver assignments in a durable SQLite overlay.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fleet_dashboard::config::Config;
use fleet_dashboard::dashboard::Dashboard;
use fleet_dashboard::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Fleet Dashboard Core");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Overlay key: {}", config.overlay_key);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Open the overlay store and hydrate before accepting requests
    let dashboard = Arc::new(Dashboard::init(&config).await?);
    if dashboard.overlay().is_degraded().await {
        tracing::warn!("Overlay persistence unavailable; assignments are kept in memory only");
    }

    let state = AppState {
        dashboard: dashboard.clone(),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    dashboard.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
