//! Expiration sweep: reaps `PENDING` reservations past their deadline.

use crate::metrics::ExpirationMetrics;
use crate::worker::Tick;
use std::sync::Arc;
use std::time::Instant;
use stockroom_core::{BoxFuture, ReservationManager, Result};

/// One pass of [`ReservationManager::process_expired_reservations`].
///
/// Carries no state between passes. Safe to run concurrently with another
/// sweep: each reservation leaves `PENDING` at most once.
pub struct ExpirationSweep {
    reservations: Arc<dyn ReservationManager>,
}

impl ExpirationSweep {
    /// Create a sweep over `reservations`.
    #[must_use]
    pub fn new(reservations: Arc<dyn ReservationManager>) -> Self {
        Self { reservations }
    }

    /// Expire every overdue reservation and return how many were expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the overdue reservations cannot be selected.
    /// Failures on individual rows are logged by the backend and skipped.
    pub async fn run(&self) -> Result<usize> {
        let started = Instant::now();
        let expired = self.reservations.process_expired_reservations().await?;
        ExpirationMetrics::record_tick(expired, started.elapsed());
        if expired > 0 {
            tracing::info!(expired, "Expired reservations released");
        }
        Ok(expired)
    }
}

impl Tick for ExpirationSweep {
    fn name(&self) -> &'static str {
        "expiration"
    }

    fn tick(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move { self.run().await.map(|n| n as u64) })
    }
}
