//! Batchtube - a bulk video download queue with a web API
//!
//! Runs as a local service: the queue, history and clipboard capture live
//! here, and any UI drives them over HTTP and a websocket.

use anyhow::Result;
use batchtube::config;
use batchtube::db::Database;
use batchtube::{server, AppState};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Starting Batchtube v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = config::load_or_create_default()?;
    info!("Configuration loaded from {:?}", config::config_path());

    // Initialize database
    let db = Database::new()?;
    info!("Database initialized");

    let clipboard_on_start = settings.clipboard.enabled;

    // Create shared application state
    let state = Arc::new(
        AppState::builder(settings)
            .key_value_store(Arc::new(db))
            .config_path(config::config_path())
            .build()?,
    );

    if clipboard_on_start {
        state.set_clipboard_enabled(true).await;
    }

    server::run(state).await
}
