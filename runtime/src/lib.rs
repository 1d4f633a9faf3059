//! # Stockroom Runtime
//!
//! Background execution for the inventory core.
//!
//! ## Core Components
//!
//! - **Expiration worker**: reaps overdue `PENDING` reservations (default every 60 s)
//! - **Event sync worker**: drains the outbox to the configured publisher (default every 10 s)
//! - **Retention worker**: deletes synced events and old terminal reservations
//! - **Metrics**: Prometheus recorder and `/metrics` listener
//!
//! Every worker is a [`PeriodicWorker`] over a [`Tick`] implementation, run
//! under a per-tick deadline and stopped by a broadcast shutdown signal.
//!
//! ## Example
//!
//! ```ignore
//! use stockroom_runtime::{EventSyncEngine, PeriodicWorker, WorkerSettings};
//! use std::time::Duration;
//!
//! let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
//! let engine = EventSyncEngine::new(outbox, publisher).with_batch_size(100);
//! let handle = PeriodicWorker::new(
//!     engine,
//!     WorkerSettings::new(Duration::from_secs(10), Duration::from_secs(30)),
//!     shutdown_tx.subscribe(),
//! )
//! .spawn();
//! ```

/// Expiration sweep
pub mod expiration;

/// Retention of synced events and terminal reservations
pub mod cleanup;

/// Prometheus metrics for observability
pub mod metrics;

/// Outbox drain
pub mod sync;

/// Periodic worker loop
pub mod worker;

pub use cleanup::{CleanupReport, RetentionCleanup, RetentionPolicy};
pub use expiration::ExpirationSweep;
pub use sync::{DEFAULT_BATCH_SIZE, EventSyncEngine, SyncReport};
pub use worker::{PeriodicWorker, Tick, TickOutcome, WorkerSettings};

/// Worker reaping overdue reservations.
pub type ExpirationWorker = PeriodicWorker<ExpirationSweep>;

/// Worker draining the outbox through publisher `P`.
pub type SyncWorker<P> = PeriodicWorker<EventSyncEngine<P>>;

/// Worker enforcing retention horizons.
pub type CleanupWorker = PeriodicWorker<RetentionCleanup>;
