//! Connection pool construction.

use crate::error;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use stockroom_core::InventoryError;

/// Pool bounds and timeouts.
///
/// The pool is the backpressure point of the service: callers beyond
/// `max_connections` queue until `acquire_timeout` and then fail.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// `PostgreSQL` connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections in the pool
    pub min_connections: u32,
    /// How long to wait for a connection
    pub acquire_timeout: Duration,
    /// Connections idle longer than this are closed
    pub idle_timeout: Duration,
}

impl PoolSettings {
    /// Settings for `url` with default bounds (10 / 2, 30 s acquire, 600 s idle).
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`InventoryError::Infrastructure`] if the database is unreachable.
pub async fn connect(settings: &PoolSettings) -> Result<PgPool, InventoryError> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout)
        .idle_timeout(settings.idle_timeout)
        .connect(&settings.url)
        .await
        .map_err(error::db("connect"))?;

    tracing::info!(
        max_connections = settings.max_connections,
        min_connections = settings.min_connections,
        "PostgreSQL pool ready"
    );

    Ok(pool)
}
