//! Wires storage, publisher, router and workers from a [`Config`].
//!
//! # Example
//!
//! ```rust,ignore
//! let app = ApplicationBuilder::new(config)
//!     .build()
//!     .await?;
//!
//! app.run().await?;
//! ```

use crate::config::{Config, DatabaseDriver, MessageBroker};
use crate::lifecycle::{Application, Workers};
use anyhow::Context;
use std::sync::Arc;
use stockroom_core::{NoopPublisher, Publisher};
use stockroom_postgres::{PoolSettings, PostgresInventory, connect};
use stockroom_redis::RedisStreamPublisher;
use stockroom_runtime::{
    EventSyncEngine, ExpirationSweep, PeriodicWorker, RetentionCleanup, RetentionPolicy,
    WorkerSettings,
};
use stockroom_testing::InMemoryInventory;
use stockroom_web::{ApiKeys, AppState};
use tokio::sync::broadcast;

/// Builder for [`Application`].
pub struct ApplicationBuilder {
    config: Arc<Config>,
    publisher: Option<Arc<dyn Publisher>>,
}

impl ApplicationBuilder {
    /// Start from a loaded configuration.
    #[must_use]
    pub fn new(config: impl Into<Arc<Config>>) -> Self {
        Self {
            config: config.into(),
            publisher: None,
        }
    }

    /// Use `publisher` instead of the one `MESSAGE_BROKER` selects.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Connect to storage and the broker, bind the listener and build the workers.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The database is unreachable or a migration fails
    /// - The broker is unreachable
    /// - The HTTP address cannot be bound
    pub async fn build(self) -> anyhow::Result<Application> {
        let config = self.config;

        let state = open_storage(&config)
            .await?
            .with_default_ttl(config.reservation_ttl_chrono()?)
            .with_api_keys(ApiKeys::new(config.server.api_keys.iter().cloned()));
        if state.api_keys.is_enabled() {
            tracing::info!(clients = state.api_keys.len(), "API key authentication enabled");
        } else {
            tracing::warn!("API_KEYS is empty, authentication disabled");
        }

        let publisher = match self.publisher {
            Some(publisher) => publisher,
            None => connect_publisher(&config).await?,
        };

        let (shutdown_tx, _) = broadcast::channel(1);
        let workers = workers(&config, &state, Arc::clone(&publisher), &shutdown_tx);

        let router = stockroom_web::router(state, config.server.request_timeout);
        let listener = tokio::net::TcpListener::bind(config.server.address())
            .await
            .with_context(|| format!("Failed to bind {}", config.server.address()))?;

        Ok(Application::new(
            listener,
            router,
            workers,
            publisher,
            shutdown_tx,
            config,
        ))
    }
}

/// Open the configured storage backend.
async fn open_storage(config: &Config) -> anyhow::Result<AppState> {
    match config.database.driver {
        DatabaseDriver::Postgres => {
            let settings = PoolSettings {
                url: config.database.url.clone(),
                max_connections: config.database.max_connections,
                min_connections: config.database.min_connections,
                acquire_timeout: config.database.connect_timeout,
                idle_timeout: config.database.idle_timeout,
            };
            let pool = connect(&settings).await?;
            let inventory =
                PostgresInventory::new(pool).with_transfer_mode(config.transfer_mode);
            inventory.migrate().await?;
            tracing::info!(transfer_mode = %config.transfer_mode, "PostgreSQL storage ready");
            Ok(AppState::from_backend(Arc::new(inventory)))
        }
        DatabaseDriver::Memory => {
            tracing::warn!("Using in-memory storage, state is lost on exit");
            Ok(AppState::from_backend(Arc::new(InMemoryInventory::new())))
        }
    }
}

/// Connect the configured publisher.
async fn connect_publisher(config: &Config) -> anyhow::Result<Arc<dyn Publisher>> {
    match config.broker.kind {
        MessageBroker::Redis => {
            let publisher = RedisStreamPublisher::builder()
                .url(config.broker.redis_url.clone())
                .stream(config.broker.stream.clone())
                .max_len(config.broker.stream_max_len)
                .timeout(config.broker.publish_timeout)
                .build()
                .await?;
            Ok(Arc::new(publisher))
        }
        MessageBroker::None => {
            tracing::info!("No message broker configured, events are logged and marked synced");
            Ok(Arc::new(NoopPublisher::new()))
        }
    }
}

/// Build the expiration, sync and retention workers.
fn workers(
    config: &Config,
    state: &AppState,
    publisher: Arc<dyn Publisher>,
    shutdown_tx: &broadcast::Sender<()>,
) -> Workers {
    let settings = &config.workers;

    let expiration = PeriodicWorker::new(
        ExpirationSweep::new(Arc::clone(&state.reservations)),
        WorkerSettings::new(settings.expiration_interval, settings.expiration_tick_timeout),
        shutdown_tx.subscribe(),
    );

    let sync = PeriodicWorker::new(
        EventSyncEngine::new(Arc::clone(&state.outbox), publisher)
            .with_batch_size(settings.sync_batch_size),
        WorkerSettings::new(settings.sync_interval, settings.sync_tick_timeout),
        shutdown_tx.subscribe(),
    );

    // Retention deletes in bulk; one interval is its deadline
    let cleanup = PeriodicWorker::new(
        RetentionCleanup::new(
            Arc::clone(&state.outbox),
            Arc::clone(&state.reservations),
            RetentionPolicy {
                event_retention_days: settings.event_retention_days,
                reservation_retention_days: settings.reservation_retention_days,
            },
        ),
        WorkerSettings::new(settings.cleanup_interval, settings.cleanup_interval),
        shutdown_tx.subscribe(),
    );

    Workers {
        expiration,
        sync,
        cleanup,
    }
}
