//! Publisher doubles
//!
//! - [`RecordingPublisher`]: keeps every accepted event for assertions
//! - [`FlakyPublisher`]: fails on demand to exercise partial drains

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use stockroom_core::{BoxFuture, EventId, OutboxEvent, Publisher, PublisherError};

/// Publisher that records every event it accepts.
///
/// Clones share the same record.
///
/// # Example
///
/// ```
/// use stockroom_testing::RecordingPublisher;
///
/// let publisher = RecordingPublisher::new();
/// assert!(publisher.is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<OutboxEvent>>>,
    closed: Arc<AtomicBool>,
}

impl RecordingPublisher {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events accepted so far, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<OutboxEvent> {
        self.published.lock().unwrap().clone()
    }

    /// Ids of accepted events, in publish order.
    #[must_use]
    pub fn published_ids(&self) -> Vec<EventId> {
        self.published.lock().unwrap().iter().map(|e| e.id).collect()
    }

    /// Number of accepted events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    /// Whether nothing was accepted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `close` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Publisher for RecordingPublisher {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn publish<'a>(
        &'a self,
        event: &'a OutboxEvent,
    ) -> BoxFuture<'a, Result<(), PublisherError>> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(PublisherError::Closed);
            }
            self.published.lock().unwrap().push(event.clone());
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), PublisherError>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Publisher that fails while an outage is simulated.
///
/// Successful publishes are recorded like [`RecordingPublisher`]. Failures
/// come from three switches: a countdown of failing calls, a global outage
/// flag and a set of event ids that always fail.
#[derive(Clone, Debug, Default)]
pub struct FlakyPublisher {
    inner: RecordingPublisher,
    fail_next: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    poisoned: Arc<Mutex<HashSet<EventId>>>,
    attempts: Arc<AtomicUsize>,
}

impl FlakyPublisher {
    /// Create a publisher that accepts everything until told otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` publish calls.
    #[must_use]
    pub fn failing_first(n: usize) -> Self {
        let publisher = Self::default();
        publisher.fail_next.store(n, Ordering::SeqCst);
        publisher
    }

    /// Start or end a simulated outage.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Always fail publishes of event `id`.
    pub fn fail_event(&self, id: EventId) {
        self.poisoned.lock().unwrap().insert(id);
    }

    /// Publish calls made so far, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// The record of accepted events.
    #[must_use]
    pub const fn recorder(&self) -> &RecordingPublisher {
        &self.inner
    }

    fn should_fail(&self, id: EventId) -> bool {
        let countdown = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        countdown || self.failing.load(Ordering::SeqCst) || self.poisoned.lock().unwrap().contains(&id)
    }
}

impl Publisher for FlakyPublisher {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn publish<'a>(
        &'a self,
        event: &'a OutboxEvent,
    ) -> BoxFuture<'a, Result<(), PublisherError>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.should_fail(event.id) {
                return Err(PublisherError::Transport("simulated outage".to_string()));
            }
            self.inner.publish(event).await
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), PublisherError>> {
        self.inner.close()
    }
}
