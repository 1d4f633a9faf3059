//! Periodic background workers.
//!
//! A [`PeriodicWorker`] drives one [`Tick`] on a fixed interval:
//!
//! ```text
//! loop {
//!     select {
//!         shutdown  => stop
//!         interval  => run tick under its deadline, log outcome
//!     }
//! }
//! ```
//!
//! The shutdown signal is only observed between ticks, so an in-flight tick
//! runs to completion (or to its deadline). A tick that overruns its deadline
//! is dropped, which rolls back any open transaction; the next tick
//! re-selects whatever work remains.

use std::time::Duration;
use stockroom_core::{BoxFuture, Result};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::metrics::WorkerMetrics;

/// One unit of periodic work.
pub trait Tick: Send + Sync + 'static {
    /// Worker name for logs and metric labels.
    fn name(&self) -> &'static str;

    /// Run one pass and report how many items it processed.
    ///
    /// # Errors
    ///
    /// Returns the storage or broker error that aborted the pass.
    fn tick(&self) -> BoxFuture<'_, Result<u64>>;
}

/// Interval and per-tick deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Time between tick starts
    pub interval: Duration,
    /// Deadline for a single tick
    pub tick_timeout: Duration,
}

impl WorkerSettings {
    /// Create settings from an interval and a per-tick deadline.
    #[must_use]
    pub const fn new(interval: Duration, tick_timeout: Duration) -> Self {
        Self {
            interval,
            tick_timeout,
        }
    }
}

/// Outcome of a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick finished and processed this many items
    Completed(u64),
    /// The tick returned an error
    Failed(String),
    /// The tick overran its deadline and was dropped
    TimedOut,
}

/// Runs a [`Tick`] on a fixed interval until shutdown.
pub struct PeriodicWorker<T> {
    task: T,
    settings: WorkerSettings,
    shutdown: broadcast::Receiver<()>,
}

impl<T: Tick> PeriodicWorker<T> {
    /// Create a worker.
    ///
    /// # Arguments
    ///
    /// * `task` - The work performed on each tick
    /// * `settings` - Interval and per-tick deadline
    /// * `shutdown` - Broadcast receiver for graceful shutdown
    #[must_use]
    pub const fn new(task: T, settings: WorkerSettings, shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            task,
            settings,
            shutdown,
        }
    }

    /// The work performed on each tick.
    #[must_use]
    pub const fn task(&self) -> &T {
        &self.task
    }

    /// Interval and deadline in use.
    #[must_use]
    pub const fn settings(&self) -> WorkerSettings {
        self.settings
    }

    /// Spawn the worker as a background task.
    ///
    /// The returned handle completes once shutdown has been observed.
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run one tick under the configured deadline.
    pub async fn run_once(&self) -> TickOutcome {
        let name = self.task.name();
        match tokio::time::timeout(self.settings.tick_timeout, self.task.tick()).await {
            Ok(Ok(processed)) => {
                if processed > 0 {
                    tracing::info!(worker = name, processed, "Worker tick completed");
                } else {
                    tracing::debug!(worker = name, "Worker tick found nothing to do");
                }
                TickOutcome::Completed(processed)
            }
            Ok(Err(e)) => {
                tracing::warn!(worker = name, error = %e, "Worker tick failed");
                TickOutcome::Failed(e.to_string())
            }
            Err(_) => {
                WorkerMetrics::record_timeout(name);
                tracing::warn!(
                    worker = name,
                    timeout = ?self.settings.tick_timeout,
                    "Worker tick exceeded its deadline"
                );
                TickOutcome::TimedOut
            }
        }
    }

    /// Run until the shutdown signal is received.
    pub async fn run(mut self) {
        let name = self.task.name();
        tracing::info!(
            worker = name,
            interval = ?self.settings.interval,
            tick_timeout = ?self.settings.tick_timeout,
            "Worker started"
        );

        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!(worker = name, "Worker received shutdown signal");
                    break;
                }
                _ = interval.tick() => {
                    self.run_once().await;
                }
            }
        }

        tracing::info!(worker = name, "Worker stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use stockroom_core::InventoryError;

    struct Counting {
        calls: Arc<AtomicU64>,
        delay: Duration,
        fail: bool,
    }

    impl Tick for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn tick(&self) -> BoxFuture<'_, Result<u64>> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                if self.fail {
                    return Err(InventoryError::infrastructure("boom"));
                }
                Ok(n)
            })
        }
    }

    fn worker(
        delay: Duration,
        fail: bool,
    ) -> (PeriodicWorker<Counting>, Arc<AtomicU64>, broadcast::Sender<()>) {
        let calls = Arc::new(AtomicU64::new(0));
        let (tx, rx) = broadcast::channel(1);
        let task = Counting {
            calls: Arc::clone(&calls),
            delay,
            fail,
        };
        let settings = WorkerSettings::new(Duration::from_millis(10), Duration::from_millis(100));
        (PeriodicWorker::new(task, settings, rx), calls, tx)
    }

    #[tokio::test]
    async fn run_once_reports_completion() {
        let (worker, _calls, _tx) = worker(Duration::ZERO, false);
        assert_eq!(worker.run_once().await, TickOutcome::Completed(1));
        assert_eq!(worker.run_once().await, TickOutcome::Completed(2));
    }

    #[tokio::test]
    async fn run_once_reports_failure() {
        let (worker, _calls, _tx) = worker(Duration::ZERO, true);
        assert!(matches!(worker.run_once().await, TickOutcome::Failed(msg) if msg.contains("boom")));
    }

    #[tokio::test(start_paused = true)]
    async fn run_once_enforces_deadline() {
        let (worker, calls, _tx) = worker(Duration::from_secs(5), false);
        assert_eq!(worker.run_once().await, TickOutcome::TimedOut);
        // The tick was dropped before it counted.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn worker_stops_on_shutdown() {
        let (worker, calls, tx) = worker(Duration::ZERO, false);
        let handle = worker.spawn();

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop")
            .unwrap();

        assert!(calls.load(Ordering::SeqCst) >= 1);
    }
}
