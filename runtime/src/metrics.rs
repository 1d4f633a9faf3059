//! Prometheus metrics for the inventory service.
//!
//! Metric families:
//! - Reservation transitions (recorded by the storage backends)
//! - Outbox drain: published, failed, synced, cleaned
//! - Worker ticks: durations and per-tick deadline overruns
//!
//! # Example
//!
//! ```rust,no_run
//! use stockroom_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Serve metrics on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Installs the global recorder and exposes `/metrics` for scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder and spawn the HTTP listener.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or bound.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), the call logs a
    /// warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;
        let handle = recorder.handle();

        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        tokio::spawn(async move {
            if let Err(e) = exporter.await {
                tracing::error!(error = ?e, "Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "stockroom_reservations_total",
        "Reservation transitions by resulting status"
    );
    describe_counter!(
        "stockroom_reservations_expired_total",
        "Reservations reaped by the expiration worker"
    );

    describe_counter!(
        "stockroom_events_published_total",
        "Outbox events accepted by the publisher"
    );
    describe_counter!(
        "stockroom_event_publish_errors_total",
        "Outbox events the publisher failed to accept"
    );
    describe_counter!(
        "stockroom_events_synced_total",
        "Outbox events marked synced"
    );
    describe_counter!(
        "stockroom_events_cleaned_total",
        "Synced outbox events removed by retention"
    );
    describe_histogram!(
        "stockroom_sync_tick_duration_seconds",
        "Time taken by one outbox drain"
    );

    describe_histogram!(
        "stockroom_expiration_tick_duration_seconds",
        "Time taken by one expiration sweep"
    );
    describe_counter!(
        "stockroom_worker_tick_timeouts_total",
        "Worker ticks aborted by their deadline"
    );
}

/// Outbox drain metrics recorder.
pub struct SyncMetrics;

impl SyncMetrics {
    /// Record an event accepted by the publisher.
    pub fn record_published(publisher: &'static str) {
        counter!("stockroom_events_published_total", "publisher" => publisher).increment(1);
    }

    /// Record a publish failure.
    pub fn record_publish_error(publisher: &'static str) {
        counter!("stockroom_event_publish_errors_total", "publisher" => publisher).increment(1);
    }

    /// Record one drain.
    pub fn record_tick(synced: usize, duration: Duration) {
        counter!("stockroom_events_synced_total").increment(synced as u64);
        histogram!("stockroom_sync_tick_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Expiration sweep metrics recorder.
pub struct ExpirationMetrics;

impl ExpirationMetrics {
    /// Record one sweep.
    pub fn record_tick(expired: usize, duration: Duration) {
        counter!("stockroom_reservations_expired_total").increment(expired as u64);
        histogram!("stockroom_expiration_tick_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Retention metrics recorder.
pub struct CleanupMetrics;

impl CleanupMetrics {
    /// Record removed events.
    pub fn record_events_cleaned(count: u64) {
        counter!("stockroom_events_cleaned_total").increment(count);
    }
}

/// Worker loop metrics recorder.
pub struct WorkerMetrics;

impl WorkerMetrics {
    /// Record a tick that overran its deadline.
    pub fn record_timeout(worker: &'static str) {
        counter!("stockroom_worker_tick_timeouts_total", "worker" => worker).increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[tokio::test]
    async fn test_metrics_server_render() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        SyncMetrics::record_published("noop");
        SyncMetrics::record_tick(3, Duration::from_millis(20));
        ExpirationMetrics::record_tick(1, Duration::from_millis(5));
        WorkerMetrics::record_timeout("sync");

        // Another test may have installed the recorder first.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("stockroom_events_published_total"));
            assert!(rendered.contains("stockroom_events_synced_total"));
            assert!(rendered.contains("stockroom_reservations_expired_total"));
            assert!(rendered.contains("stockroom_worker_tick_timeouts_total"));
        }
    }
}
