//! Event sync engine: drains the outbox to a [`Publisher`].
//!
//! Each pass:
//! 1. fetches up to `batch_size` unsynced events, oldest first;
//! 2. publishes them one at a time, skipping (and logging) failures;
//! 3. marks every accepted event synced in one outbox call.
//!
//! An event is never marked without an accepted publish. If the process stops
//! between a publish and the mark, the next pass publishes the event again
//! with the same id, so consumers deduplicate on `id`.

use crate::metrics::SyncMetrics;
use crate::worker::Tick;
use std::sync::Arc;
use std::time::Instant;
use stockroom_core::{
    BoxFuture, Clock, EventId, EventOutbox, Publisher, PublisherError, Result, SystemClock,
};

/// Default number of events drained per pass.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Result of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Unsynced events fetched
    pub fetched: usize,
    /// Events the publisher accepted
    pub published: usize,
    /// Events the publisher rejected
    pub failed: usize,
    /// Events newly marked synced
    pub synced: usize,
}

/// Drains unsynced outbox events to a publisher.
///
/// The publisher is held by value; pass an `Arc<dyn Publisher>` to share it
/// with the shutdown path.
pub struct EventSyncEngine<P> {
    outbox: Arc<dyn EventOutbox>,
    publisher: P,
    clock: Arc<dyn Clock>,
    batch_size: usize,
}

impl<P: Publisher> EventSyncEngine<P> {
    /// Create an engine with the default batch size and the system clock.
    #[must_use]
    pub fn new(outbox: Arc<dyn EventOutbox>, publisher: P) -> Self {
        Self {
            outbox,
            publisher,
            clock: Arc::new(SystemClock),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the number of events drained per pass. Zero is raised to one.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Use `clock` for `synced_at` timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Events drained per pass.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The publisher events are handed to.
    #[must_use]
    pub const fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Run one drain and return the number of events marked synced.
    ///
    /// # Errors
    ///
    /// Returns an error if the outbox cannot be read or the mark fails.
    /// Publisher failures are not errors: those events stay unsynced.
    pub async fn sync_once(&self) -> Result<usize> {
        Ok(self.drain().await?.synced)
    }

    /// Run one drain and return its full report.
    ///
    /// # Errors
    ///
    /// Returns an error if the outbox cannot be read or the mark fails.
    pub async fn drain(&self) -> Result<SyncReport> {
        let started = Instant::now();
        let events = self.outbox.fetch_unsynced(self.batch_size).await?;
        let mut report = SyncReport {
            fetched: events.len(),
            ..SyncReport::default()
        };
        if events.is_empty() {
            return Ok(report);
        }

        let publisher = self.publisher.name();
        let mut accepted: Vec<EventId> = Vec::with_capacity(events.len());
        for event in &events {
            match self.publisher.publish(event).await {
                Ok(()) => {
                    SyncMetrics::record_published(publisher);
                    accepted.push(event.id);
                }
                Err(e) => {
                    SyncMetrics::record_publish_error(publisher);
                    tracing::warn!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        publisher,
                        error = %e,
                        "Failed to publish event, leaving it unsynced"
                    );
                }
            }
        }
        report.published = accepted.len();
        report.failed = report.fetched - report.published;

        if !accepted.is_empty() {
            report.synced = self.outbox.mark_synced(accepted, self.clock.now()).await?;
        }

        SyncMetrics::record_tick(report.synced, started.elapsed());
        tracing::info!(
            fetched = report.fetched,
            published = report.published,
            failed = report.failed,
            synced = report.synced,
            "Outbox drained"
        );
        Ok(report)
    }

    /// Close the publisher.
    ///
    /// # Errors
    ///
    /// Returns the publisher's shutdown error.
    pub async fn close(&self) -> std::result::Result<(), PublisherError> {
        self.publisher.close().await
    }
}

impl<P: Publisher + 'static> Tick for EventSyncEngine<P> {
    fn name(&self) -> &'static str {
        "event-sync"
    }

    fn tick(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move { self.sync_once().await.map(|n| n as u64) })
    }
}
