//! Commutecast service - HTTP API for the route lifecycle.
//!
//! This is the main entry point for the commutecast service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commutecast_service::{create_router, AppState, ServiceConfig};
use commutecast_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,commutecast=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting commutecast service");

    let config = ServiceConfig::from_env();
    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        "Service configuration loaded"
    );

    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.data_dir)?);

    let state = AppState::new(store, config.clone());
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    axum::serve(listener, app).await?;

    Ok(())
}
