//! # Stockroom Redis
//!
//! Redis Streams implementation of the [`Publisher`] capability.
//!
//! Each outbox event becomes one stream entry appended with
//! `XADD <stream> MAXLEN ~ <n> * field value ...`, so the stream stays
//! approximately bounded without blocking writers on exact trimming.
//!
//! # Entry layout
//!
//! | Field | Value |
//! |---|---|
//! | `id` | event id, hyphenated UUID |
//! | `event_type` | e.g. `reservation.created` |
//! | `store_id` | store the mutation touched |
//! | `aggregate_id` | stock or reservation id |
//! | `payload` | JSON-encoded payload map |
//! | `timestamp` | RFC 3339 creation time |
//!
//! Consumers must deduplicate on `id`: the sync engine re-publishes an event
//! if the process stops between the broker ack and the outbox update.
//!
//! # Example
//!
//! ```no_run
//! use stockroom_redis::RedisStreamPublisher;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let publisher = RedisStreamPublisher::builder()
//!     .url("redis://localhost:6379")
//!     .stream("stockroom-events")
//!     .max_len(100_000)
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use stockroom_core::{BoxFuture, OutboxEvent, Publisher, PublisherError};

/// Default stream key.
pub const DEFAULT_STREAM: &str = "stockroom-events";

/// Default approximate stream length bound.
pub const DEFAULT_MAX_LEN: usize = 100_000;

/// Default per-publish deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Publisher appending outbox events to a bounded Redis stream.
///
/// The connection manager reconnects on its own after transport failures, so
/// a publisher survives broker restarts; publishes made while Redis is down
/// fail with [`PublisherError::Transport`] or [`PublisherError::Timeout`] and
/// are retried by the sync engine on a later tick.
pub struct RedisStreamPublisher {
    conn_manager: ConnectionManager,
    stream: String,
    max_len: usize,
    timeout: Duration,
    closed: AtomicBool,
}

impl RedisStreamPublisher {
    /// Create a builder for configuring the publisher.
    #[must_use]
    pub fn builder() -> RedisStreamPublisherBuilder {
        RedisStreamPublisherBuilder::new()
    }

    /// Connect with default stream settings.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherError::Transport`] if the URL is invalid or Redis
    /// cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, PublisherError> {
        Self::builder().url(url).build().await
    }

    /// Stream key entries are appended to.
    #[must_use]
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Approximate stream length bound passed to `MAXLEN ~`.
    #[must_use]
    pub const fn max_len(&self) -> usize {
        self.max_len
    }

    /// Per-publish deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether [`Publisher::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn xadd(&self, fields: Vec<(&'static str, String)>) -> Result<String, RedisError> {
        let mut conn = self.conn_manager.clone();
        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_len)
            .arg("*");
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        cmd.query_async(&mut conn).await
    }
}

/// Encode an event as the field/value list of one stream entry.
///
/// # Errors
///
/// Returns [`PublisherError::Serialization`] if the payload cannot be
/// rendered as JSON.
pub fn stream_fields(event: &OutboxEvent) -> Result<Vec<(&'static str, String)>, PublisherError> {
    let payload = serde_json::to_string(&event.payload)
        .map_err(|e| PublisherError::Serialization(format!("event {}: {e}", event.id)))?;
    Ok(vec![
        ("id", event.id.to_string()),
        ("event_type", event.event_type.as_str().to_string()),
        ("store_id", event.store_id.to_string()),
        ("aggregate_id", event.aggregate_id.clone()),
        ("payload", payload),
        ("timestamp", event.created_at.to_rfc3339()),
    ])
}

fn map_redis_error(err: &RedisError) -> PublisherError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
        PublisherError::Transport(err.to_string())
    } else {
        PublisherError::Rejected(err.to_string())
    }
}

impl Publisher for RedisStreamPublisher {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn publish<'a>(
        &'a self,
        event: &'a OutboxEvent,
    ) -> BoxFuture<'a, Result<(), PublisherError>> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(PublisherError::Closed);
            }
            let fields = stream_fields(event)?;

            match tokio::time::timeout(self.timeout, self.xadd(fields)).await {
                Ok(Ok(entry_id)) => {
                    tracing::debug!(
                        stream = %self.stream,
                        entry_id = %entry_id,
                        event_id = %event.id,
                        event_type = %event.event_type,
                        "Event appended to stream"
                    );
                    Ok(())
                }
                Ok(Err(e)) => {
                    tracing::error!(
                        stream = %self.stream,
                        event_id = %event.id,
                        error = %e,
                        "Failed to append event to stream"
                    );
                    Err(map_redis_error(&e))
                }
                Err(_) => {
                    tracing::warn!(
                        stream = %self.stream,
                        event_id = %event.id,
                        timeout = ?self.timeout,
                        "Stream append timed out"
                    );
                    Err(PublisherError::Timeout(self.timeout))
                }
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), PublisherError>> {
        Box::pin(async move {
            if !self.closed.swap(true, Ordering::AcqRel) {
                tracing::info!(stream = %self.stream, "Redis stream publisher closed");
            }
            Ok(())
        })
    }
}

/// Builder for [`RedisStreamPublisher`].
#[derive(Debug, Default)]
pub struct RedisStreamPublisherBuilder {
    url: Option<String>,
    stream: Option<String>,
    max_len: Option<usize>,
    timeout: Option<Duration>,
}

impl RedisStreamPublisherBuilder {
    /// Create a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Redis connection URL (e.g. `redis://localhost:6379`). Required.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the stream key (default: `stockroom-events`).
    #[must_use]
    pub fn stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    /// Set the approximate stream length bound (default: 100 000).
    #[must_use]
    pub const fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    /// Set the per-publish deadline (default: 5 seconds).
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Connect and build the [`RedisStreamPublisher`].
    ///
    /// # Errors
    ///
    /// Returns [`PublisherError::Transport`] if:
    /// - The URL is not set or cannot be parsed
    /// - The stream key or bound is empty
    /// - The connection manager cannot reach Redis
    pub async fn build(self) -> Result<RedisStreamPublisher, PublisherError> {
        let url = self
            .url
            .ok_or_else(|| PublisherError::Transport("Redis URL not configured".to_string()))?;
        let stream = self.stream.unwrap_or_else(|| DEFAULT_STREAM.to_string());
        if stream.trim().is_empty() {
            return Err(PublisherError::Transport(
                "Redis stream key must not be empty".to_string(),
            ));
        }
        let max_len = self.max_len.unwrap_or(DEFAULT_MAX_LEN);
        if max_len == 0 {
            return Err(PublisherError::Transport(
                "Redis stream bound must be greater than 0".to_string(),
            ));
        }

        let client = Client::open(url.as_str()).map_err(|e| {
            PublisherError::Transport(format!("Failed to create Redis client: {e}"))
        })?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            PublisherError::Transport(format!("Failed to create Redis connection manager: {e}"))
        })?;

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        tracing::info!(
            stream = %stream,
            max_len,
            timeout = ?timeout,
            "RedisStreamPublisher created successfully"
        );

        Ok(RedisStreamPublisher {
            conn_manager,
            stream,
            max_len,
            timeout,
            closed: AtomicBool::new(false),
        })
    }
}
