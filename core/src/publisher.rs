//! Broker publisher capability.
//!
//! A [`Publisher`] hands outbox events to an external message bus. The contract
//! is synchronous per call: `Ok(())` means the broker durably accepted the
//! event, any error means it did not and the event stays unsynced.
//!
//! Implementations are chosen at startup and injected into the sync engine by
//! value:
//!
//! - [`NoopPublisher`] - logs and succeeds, for tests and bus-less deployments
//! - `RedisStreamPublisher` (in `stockroom-redis`) - appends to a bounded stream

use crate::outbox::OutboxEvent;
use crate::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors a publisher can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublisherError {
    /// Failed to reach the broker
    #[error("Transport error: {0}")]
    Transport(String),

    /// The broker refused the event
    #[error("Broker rejected event: {0}")]
    Rejected(String),

    /// The event could not be encoded
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// No acknowledgement within the deadline
    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),

    /// The publisher was closed
    #[error("Publisher is closed")]
    Closed,
}

/// Capability to publish outbox events to a broker.
pub trait Publisher: Send + Sync {
    /// Short name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Publish one event.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherError`] on any transport or rejection condition.
    fn publish<'a>(&'a self, event: &'a OutboxEvent)
    -> BoxFuture<'a, Result<(), PublisherError>>;

    /// Publish several events in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first [`PublisherError`] encountered.
    fn publish_batch<'a>(
        &'a self,
        events: &'a [OutboxEvent],
    ) -> BoxFuture<'a, Result<(), PublisherError>> {
        Box::pin(async move {
            for event in events {
                self.publish(event).await?;
            }
            Ok(())
        })
    }

    /// Release broker resources. Later publishes fail with [`PublisherError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`PublisherError`] if shutdown of the underlying client fails.
    fn close(&self) -> BoxFuture<'_, Result<(), PublisherError>>;
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn publish<'a>(
        &'a self,
        event: &'a OutboxEvent,
    ) -> BoxFuture<'a, Result<(), PublisherError>> {
        (**self).publish(event)
    }

    fn publish_batch<'a>(
        &'a self,
        events: &'a [OutboxEvent],
    ) -> BoxFuture<'a, Result<(), PublisherError>> {
        (**self).publish_batch(events)
    }

    fn close(&self) -> BoxFuture<'_, Result<(), PublisherError>> {
        (**self).close()
    }
}

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn publish<'a>(
        &'a self,
        event: &'a OutboxEvent,
    ) -> BoxFuture<'a, Result<(), PublisherError>> {
        (**self).publish(event)
    }

    fn publish_batch<'a>(
        &'a self,
        events: &'a [OutboxEvent],
    ) -> BoxFuture<'a, Result<(), PublisherError>> {
        (**self).publish_batch(events)
    }

    fn close(&self) -> BoxFuture<'_, Result<(), PublisherError>> {
        (**self).close()
    }
}

/// Publisher that logs each event and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl NoopPublisher {
    /// Creates a new `NoopPublisher`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Publisher for NoopPublisher {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn publish<'a>(
        &'a self,
        event: &'a OutboxEvent,
    ) -> BoxFuture<'a, Result<(), PublisherError>> {
        Box::pin(async move {
            tracing::debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                aggregate_id = %event.aggregate_id,
                "Event published (noop)"
            );
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), PublisherError>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ids::{ProductId, StoreId};
    use crate::stock::Stock;
    use chrono::Utc;

    #[tokio::test]
    async fn noop_publisher_accepts_everything() {
        let stock = Stock::initialize(ProductId::new(), StoreId::new("s"), 1, Utc::now()).unwrap();
        let events = vec![
            OutboxEvent::stock_created(&stock, Utc::now()),
            OutboxEvent::stock_created(&stock, Utc::now()),
        ];
        let publisher: Box<dyn Publisher> = Box::new(NoopPublisher::new());
        publisher.publish(&events[0]).await.unwrap();
        publisher.publish_batch(&events).await.unwrap();
        publisher.close().await.unwrap();
        assert_eq!(publisher.name(), "noop");
    }

    #[test]
    fn timeout_error_display() {
        let err = PublisherError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "Publish timed out after 5s");
    }
}
