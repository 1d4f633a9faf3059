//! # Stockroom Core
//!
//! Domain types, error taxonomy and capability traits for multi-store
//! inventory with time-bound reservations.
//!
//! ## Core Concepts
//!
//! - **Stock**: units on hand and units held for one `(product, store)` pair
//! - **Reservation**: a time-bound hold that leaves `PENDING` exactly once
//! - **Outbox**: events written in the same transaction as the change they describe
//! - **Publisher**: the broker the outbox is drained to
//!
//! ## Capabilities
//!
//! Storage backends implement four traits, each usable as a trait object:
//!
//! - [`ProductCatalog`] - referential-integrity source for stock and reservations
//! - [`StockLedger`] - transactional row operations
//! - [`ReservationManager`] - the reservation state machine
//! - [`EventOutbox`] - outbox draining and retention
//!
//! The ledger never calls into the reservation manager. The reservation manager
//! runs ledger row operations inside its own transaction.
//!
//! ## Example
//!
//! ```ignore
//! use stockroom_core::*;
//!
//! async fn hold(inventory: &(impl StockLedger + ReservationManager)) -> Result<()> {
//!     let product = ProductId::new();
//!     let store = StoreId::new("s1");
//!     inventory.initialize_stock(product, store.clone(), 100).await?;
//!
//!     let reservation = inventory
//!         .create_reservation(NewReservation {
//!             product_id: product,
//!             store_id: store,
//!             customer_id: CustomerId::new("c-42"),
//!             quantity: 10,
//!             ttl: chrono::Duration::minutes(15),
//!         })
//!         .await?;
//!     inventory.confirm_reservation(reservation.id).await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod environment;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod outbox;
pub mod product;
pub mod publisher;
pub mod reservation;
pub mod stock;

pub use chrono::{DateTime, Utc};
pub use environment::{Clock, SystemClock};
pub use error::{ErrorKind, InventoryError, Result};
pub use ids::{CustomerId, EventId, ParseIdError, ProductId, ReservationId, StockId, StoreId};
pub use ledger::{StockLedger, Transfer, TransferMode};
pub use outbox::{AggregateType, EventOutbox, EventType, OutboxEvent};
pub use product::{NewProduct, Product, ProductCatalog, ProductUpdate};
pub use publisher::{NoopPublisher, Publisher, PublisherError};
pub use reservation::{
    ExpireOutcome, NewReservation, Reservation, ReservationManager, ReservationStats,
    ReservationStatus,
};
pub use stock::Stock;

/// Boxed future returned by every capability trait.
///
/// Explicit `Pin<Box<dyn Future>>` returns keep the traits dyn-compatible so
/// backends can be shared as `Arc<dyn Trait>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
