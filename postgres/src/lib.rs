//! `PostgreSQL` persistence for the Stockroom inventory core.
//!
//! [`PostgresInventory`] implements every storage capability of
//! `stockroom-core` on one connection pool:
//!
//! - `ProductCatalog` over the `products` table
//! - `StockLedger` over `stock`, with `SELECT ... FOR UPDATE` on hot paths and a
//!   version compare-and-swap for blind quantity updates
//! - `ReservationManager` over `reservations`, running each transition and its
//!   ledger operation in one transaction
//! - `EventOutbox` over `events`, which every mutation appends to inside its
//!   own transaction
//!
//! # Locking
//!
//! A transaction that touches a reservation locks the reservation row first
//! and its stock row second. A transaction that touches two stock rows locks
//! them in `(product_id, store_id)` ascending order.
//!
//! # Cancellation
//!
//! Every operation runs inside a `sqlx::Transaction`. Dropping the future (for
//! example when a caller's deadline fires) drops the transaction, which rolls
//! back, so no partial state is ever committed.
//!
//! # Example
//!
//! ```no_run
//! use stockroom_postgres::{PoolSettings, PostgresInventory};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = stockroom_postgres::connect(&PoolSettings::new("postgres://localhost/stockroom")).await?;
//! let inventory = PostgresInventory::new(pool);
//! inventory.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod error;
mod ledger;
mod outbox;
mod pool;
mod reservations;
mod rows;

pub use pool::{PoolSettings, connect};

use sqlx::PgPool;
use std::sync::Arc;
use stockroom_core::{Clock, InventoryError, SystemClock, TransferMode};

/// `PostgreSQL`-backed inventory.
#[derive(Clone)]
pub struct PostgresInventory {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    transfer_mode: TransferMode,
}

impl PostgresInventory {
    /// Create an inventory over `pool` using the system clock and
    /// compensating transfers.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
            transfer_mode: TransferMode::default(),
        }
    }

    /// Replace the clock used for timestamps and expiry decisions.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Select how `transfer_stock` spans its two rows.
    #[must_use]
    pub const fn with_transfer_mode(mut self, mode: TransferMode) -> Self {
        self.transfer_mode = mode;
        self
    }

    /// Run the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Infrastructure`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), InventoryError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| InventoryError::infrastructure(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Cheap liveness probe against the database.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Infrastructure`] if the query fails.
    pub async fn ping(&self) -> Result<(), InventoryError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(error::db("ping"))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Configured transfer mode.
    #[must_use]
    pub const fn transfer_mode(&self) -> TransferMode {
        self.transfer_mode
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, InventoryError> {
        self.pool.begin().await.map_err(error::db("begin transaction"))
    }
}
