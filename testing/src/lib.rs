//! # Stockroom Testing
//!
//! Test infrastructure for the Stockroom inventory core.
//!
//! This crate provides:
//! - [`InMemoryInventory`]: every storage capability over one in-process state
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - Publisher doubles ([`RecordingPublisher`], [`FlakyPublisher`])
//! - Request fixtures
//!
//! The in-memory backend is also what the server runs on when configured
//! with the `memory` database driver.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use stockroom_core::{ProductCatalog, ReservationManager, StockLedger, StoreId};
//! use stockroom_testing::{InMemoryInventory, ManualClock, fixtures};
//!
//! # async fn example() -> stockroom_core::Result<()> {
//! let clock = ManualClock::default();
//! let inventory = InMemoryInventory::with_clock(Arc::new(clock.clone()));
//! let store = StoreId::new("s1");
//!
//! let product = inventory.create_product(fixtures::new_product("SKU-1")).await?;
//! inventory.initialize_stock(product.id, store.clone(), 100).await?;
//! inventory
//!     .create_reservation(fixtures::hold(product.id, &store, "c-1", 10, 15))
//!     .await?;
//!
//! clock.advance(chrono::Duration::minutes(16));
//! assert_eq!(inventory.process_expired_reservations().await?, 1);
//! # Ok(())
//! # }
//! ```

/// Deterministic clocks
pub mod clock;

/// Request builders
pub mod fixtures;

/// In-memory storage engine
pub mod memory;

/// Publisher doubles
pub mod publishers;

pub use clock::{FixedClock, ManualClock, test_clock, test_time};
pub use memory::InMemoryInventory;
pub use publishers::{FlakyPublisher, RecordingPublisher};
