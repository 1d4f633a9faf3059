//! Retention: removes synced events and terminal reservations past their
//! horizons.

use crate::metrics::CleanupMetrics;
use crate::worker::Tick;
use chrono::Duration;
use std::sync::Arc;
use stockroom_core::{BoxFuture, Clock, EventOutbox, ReservationManager, Result, SystemClock};

/// Retention horizons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Synced events older than this many days are deleted
    pub event_retention_days: u32,
    /// Terminal reservations untouched for this many days are deleted
    pub reservation_retention_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            event_retention_days: 7,
            reservation_retention_days: 30,
        }
    }
}

/// Removed row counts of one retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Synced events deleted
    pub events: u64,
    /// Terminal reservations deleted
    pub reservations: u64,
}

/// One retention pass over the outbox and the reservations.
pub struct RetentionCleanup {
    outbox: Arc<dyn EventOutbox>,
    reservations: Arc<dyn ReservationManager>,
    clock: Arc<dyn Clock>,
    policy: RetentionPolicy,
}

impl RetentionCleanup {
    /// Create a retention pass with the system clock.
    #[must_use]
    pub fn new(
        outbox: Arc<dyn EventOutbox>,
        reservations: Arc<dyn ReservationManager>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            outbox,
            reservations,
            clock: Arc::new(SystemClock),
            policy,
        }
    }

    /// Use `clock` to compute the reservation horizon.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Horizons in use.
    #[must_use]
    pub const fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Delete expired rows from both relations.
    ///
    /// # Errors
    ///
    /// Returns the first storage error; rows removed before it stay removed.
    pub async fn run(&self) -> Result<CleanupReport> {
        let events = self
            .outbox
            .cleanup_old_events(self.policy.event_retention_days)
            .await?;
        CleanupMetrics::record_events_cleaned(events);

        let horizon =
            self.clock.now() - Duration::days(i64::from(self.policy.reservation_retention_days));
        let reservations = self.reservations.purge_terminal_reservations(horizon).await?;

        if events > 0 || reservations > 0 {
            tracing::info!(events, reservations, "Retention cleanup completed");
        }
        Ok(CleanupReport {
            events,
            reservations,
        })
    }
}

impl Tick for RetentionCleanup {
    fn name(&self) -> &'static str {
        "retention"
    }

    fn tick(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            let report = self.run().await?;
            Ok(report.events + report.reservations)
        })
    }
}
