//! Vessel tracker - AIS position store with map-facing HTTP API
//!
//! Keeps vessel position reports and serves:
//! - Latest position of every vessel, and per-vessel trajectories
//! - Form ingestion of new reports
//! - Type, trajectory and cluster predictions from external scripts

mod config;
mod db;
mod error;
mod ingest;
mod models;
mod prediction;
mod query;
mod web;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    let config = config::Config::load()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    // Use LOG_FORMAT=gcp for structured GCP Cloud Logging
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "gcp" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting vessel tracker...");

    let db = db::Database::new(&config.database).await?;
    db.run_migrations().await?;
    info!("Database initialized at {}", config.database.url);

    let predictor = Arc::new(prediction::ScriptPredictor::new(config.prediction.clone()));
    let state = Arc::new(web::AppState::new(db, predictor));

    web::start_server(&config, state).await?;

    Ok(())
}
