//! Evidence store server

use std::net::SocketAddr;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oob_evidence::{config::Config, create_router, AppState, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "oob_evidence=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing::info!("Evidence store starting...");
    tracing::info!("Database: {}", config.database_url.split('@').last().unwrap_or("***"));

    if config.admin_token.is_none() {
        if config.is_production() {
            anyhow::bail!("ADMIN_TOKEN must be set in production");
        }
        tracing::warn!("ADMIN_TOKEN is not set, management API is open");
    }

    // Initialize storage
    let storage = Storage::connect(&config.database_url, config.max_connections)
        .await
        .context("Failed to connect to database")?;

    if storage.single_writer() {
        tracing::info!("Single-writer backend, record writes are serialized");
    }

    // Run migrations
    tracing::info!("Running database migrations...");
    storage.migrate().await.context("Failed to run migrations")?;

    // Build application state
    let state = AppState {
        storage,
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("Server error")?;

    Ok(())
}
