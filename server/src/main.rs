//! Stockroom inventory server.
//!
//! This binary:
//! - Loads configuration from the environment (and `.env`)
//! - Opens `PostgreSQL` (or in-memory) storage and runs migrations
//! - Connects the outbox publisher (Redis stream or none)
//! - Serves the HTTP API and Prometheus metrics
//! - Runs the expiration, sync and retention workers until shutdown
//!
//! # Usage
//!
//! ```bash
//! # Start infrastructure
//! docker compose up -d
//!
//! # Run server
//! cargo run --bin stockroom
//! ```

use stockroom_runtime::metrics::MetricsServer;
use stockroom_server::{ApplicationBuilder, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,stockroom=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Stockroom inventory server...");

    let config = Config::from_env()?;
    tracing::info!(
        driver = ?config.database.driver,
        broker = ?config.broker.kind,
        transfer_mode = %config.transfer_mode,
        address = %config.server.address(),
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(config.server.metrics_address().parse()?);
    metrics.start()?;

    let app = ApplicationBuilder::new(config).build().await?;
    tracing::info!("Application initialized, press Ctrl+C to shutdown");

    app.run().await
}
