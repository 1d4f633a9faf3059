//! Application lifecycle management and graceful shutdown.
//!
//! This module provides the `Application` struct that manages the complete
//! lifecycle of the inventory service:
//!
//! 1. **Startup**: Spawn the expiration, sync and retention workers
//! 2. **Runtime**: Serve HTTP until a shutdown signal arrives
//! 3. **Shutdown**: Coordinate graceful termination of all tasks
//!
//! # Graceful Shutdown
//!
//! When a shutdown signal is received (Ctrl+C or SIGTERM):
//! 1. HTTP server stops accepting new connections and drains in-flight requests
//! 2. Shutdown signal broadcast to all workers
//! 3. Each worker finishes its current tick (bounded by `SHUTDOWN_TIMEOUT`)
//! 4. The publisher is closed
//!
//! Events still unsynced at exit stay in the outbox and are picked up by the
//! next sync tick after restart.

use crate::config::Config;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use stockroom_core::Publisher;
use stockroom_runtime::{CleanupWorker, ExpirationWorker, SyncWorker};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The three background workers, built but not yet running.
pub struct Workers {
    /// Reaps overdue reservations
    pub expiration: ExpirationWorker,
    /// Drains the outbox
    pub sync: SyncWorker<Arc<dyn Publisher>>,
    /// Enforces retention horizons
    pub cleanup: CleanupWorker,
}

impl Workers {
    fn spawn(self) -> Vec<(&'static str, JoinHandle<()>)> {
        vec![
            ("expiration", self.expiration.spawn()),
            ("event-sync", self.sync.spawn()),
            ("cleanup", self.cleanup.spawn()),
        ]
    }
}

/// Running application with all background tasks.
///
/// Created by [`ApplicationBuilder`](crate::bootstrap::ApplicationBuilder);
/// owns the listener, the router, the workers and the publisher.
pub struct Application {
    listener: tokio::net::TcpListener,
    router: axum::Router,
    workers: Workers,
    publisher: Arc<dyn Publisher>,
    shutdown_tx: broadcast::Sender<()>,
    config: Arc<Config>,
}

impl Application {
    /// Assemble an application from its parts.
    ///
    /// `workers` must have been created with receivers of `shutdown_tx`.
    #[must_use]
    pub fn new(
        listener: tokio::net::TcpListener,
        router: axum::Router,
        workers: Workers,
        publisher: Arc<dyn Publisher>,
        shutdown_tx: broadcast::Sender<()>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            listener,
            router,
            workers,
            publisher,
            shutdown_tx,
            config,
        }
    }

    /// Address the HTTP listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns the socket error if the address cannot be read.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP server fails.
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `signal` completes, then shut down gracefully.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP server fails.
    pub async fn run_until<F>(self, signal: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shutdown_timeout = self.config.server.shutdown_timeout;

        info!("Starting background workers");
        let handles = self.workers.spawn();

        info!(
            address = %self.listener.local_addr()?,
            "HTTP server listening for requests"
        );
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(signal)
            .await?;

        info!("HTTP server stopped, initiating graceful shutdown...");

        // Workers only observe the signal between ticks
        let _ = self.shutdown_tx.send(());
        await_shutdown(handles, shutdown_timeout).await;

        match self.publisher.close().await {
            Ok(()) => info!(publisher = self.publisher.name(), "Publisher closed"),
            Err(e) => warn!(publisher = self.publisher.name(), error = %e, "Publisher close failed"),
        }

        info!("Graceful shutdown complete");
        Ok(())
    }
}

/// Wait for every worker, giving each `timeout` to finish its tick.
async fn await_shutdown(handles: Vec<(&'static str, JoinHandle<()>)>, timeout: Duration) {
    for (worker, handle) in handles {
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => info!(worker, "Worker stopped gracefully"),
            Ok(Err(e)) => warn!(worker, error = %e, "Worker task failed"),
            Err(_) => warn!(worker, "Worker shutdown timed out"),
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// A handler that cannot be installed never fires; the other one still does.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
