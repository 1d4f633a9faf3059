//! Stock rows and the pure rules every ledger backend enforces.
//!
//! A [`Stock`] row is keyed by `(product_id, store_id)` and tracks two
//! counters: `quantity` on hand and `reserved` units held by pending
//! reservations. The rules here decide whether a mutation is allowed; the
//! backends decide how to apply it atomically (row lock, conditional update).
//!
//! ```text
//! 0 <= reserved <= quantity
//! available = quantity - reserved
//! ```

use crate::error::{InventoryError, Result};
use crate::ids::{ProductId, StockId, StoreId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inventory for one product in one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    /// Surrogate key
    pub id: StockId,
    /// Product
    pub product_id: ProductId,
    /// Store
    pub store_id: StoreId,
    /// Units on hand
    pub quantity: i64,
    /// Units held by pending reservations
    pub reserved: i64,
    /// Optimistic version, starts at 1 and is bumped on every update
    pub version: i64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Stock {
    /// Build a fresh row for `InitializeStock`.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Validation`] if `initial_quantity` is negative
    /// or the store id is blank.
    pub fn initialize(
        product_id: ProductId,
        store_id: StoreId,
        initial_quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        ensure_store(&store_id)?;
        if initial_quantity < 0 {
            return Err(InventoryError::validation(
                "initial_quantity must be non-negative",
            ));
        }
        Ok(Self {
            id: StockId::new(),
            product_id,
            store_id,
            quantity: initial_quantity,
            reserved: 0,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Units a new reservation may claim.
    #[must_use]
    pub const fn available(&self) -> i64 {
        self.quantity - self.reserved
    }

    /// `0 <= reserved <= quantity` and `version >= 1`.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.reserved >= 0 && self.reserved <= self.quantity && self.version >= 1
    }

    /// Lock-ordering key. Rows are always locked in ascending key order.
    #[must_use]
    pub fn lock_key(&self) -> (ProductId, &StoreId) {
        (self.product_id, &self.store_id)
    }

    /// Check that `n` more units can be held.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::InsufficientStock`] if `available < n`.
    pub fn check_reserve(&self, n: i64) -> Result<()> {
        let available = self.available();
        if available < n {
            return Err(InventoryError::InsufficientStock {
                available,
                requested: n,
            });
        }
        Ok(())
    }

    /// Check that `n` held units can be released.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Conflict`] if `reserved < n`.
    pub fn check_release(&self, n: i64) -> Result<()> {
        if self.reserved < n {
            return Err(InventoryError::conflict(format!(
                "cannot release {n} units, only {} reserved",
                self.reserved
            )));
        }
        Ok(())
    }

    /// Check that `n` held units can be converted into a sale.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Conflict`] unless `quantity >= n` and `reserved >= n`.
    pub fn check_confirm(&self, n: i64) -> Result<()> {
        if self.quantity < n || self.reserved < n {
            return Err(InventoryError::conflict(format!(
                "cannot confirm {n} units (quantity {}, reserved {})",
                self.quantity, self.reserved
            )));
        }
        Ok(())
    }

    /// Check a blind quantity overwrite.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Validation`] if `new_quantity` is negative or
    /// below the currently reserved units.
    pub fn check_quantity_update(&self, new_quantity: i64) -> Result<()> {
        if new_quantity < 0 {
            return Err(InventoryError::validation("quantity must be non-negative"));
        }
        if new_quantity < self.reserved {
            return Err(InventoryError::validation(format!(
                "quantity {new_quantity} is below reserved {}",
                self.reserved
            )));
        }
        Ok(())
    }

    /// Quantity after applying `delta`.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Validation`] if `delta` is zero or the result
    /// would be negative or below the reserved units.
    pub fn adjusted_quantity(&self, delta: i64) -> Result<i64> {
        if delta == 0 {
            return Err(InventoryError::validation("adjustment must be non-zero"));
        }
        let new_quantity = self
            .quantity
            .checked_add(delta)
            .ok_or_else(|| InventoryError::validation("adjustment overflows quantity"))?;
        self.check_quantity_update(new_quantity)?;
        Ok(new_quantity)
    }

    /// Quantity after `n` units arrive in a transfer.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Validation`] if the sum overflows.
    pub fn credited_quantity(&self, n: i64) -> Result<i64> {
        self.quantity
            .checked_add(n)
            .ok_or_else(|| InventoryError::validation("transfer overflows destination quantity"))
    }

    /// Check that `n` units can leave this row in a transfer.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Conflict`] if fewer than `n` units are available.
    pub fn check_transfer_out(&self, n: i64) -> Result<()> {
        if self.available() < n {
            return Err(InventoryError::conflict(format!(
                "cannot transfer {n} units from store {}, only {} available",
                self.store_id,
                self.available()
            )));
        }
        Ok(())
    }

    /// Hold `n` units.
    ///
    /// # Errors
    ///
    /// See [`Stock::check_reserve`].
    pub fn reserve(&mut self, n: i64, now: DateTime<Utc>) -> Result<()> {
        self.check_reserve(n)?;
        self.reserved += n;
        self.touch(now);
        Ok(())
    }

    /// Release `n` held units.
    ///
    /// # Errors
    ///
    /// See [`Stock::check_release`].
    pub fn release(&mut self, n: i64, now: DateTime<Utc>) -> Result<()> {
        self.check_release(n)?;
        self.reserved -= n;
        self.touch(now);
        Ok(())
    }

    /// Convert `n` held units into a sale.
    ///
    /// # Errors
    ///
    /// See [`Stock::check_confirm`].
    pub fn confirm(&mut self, n: i64, now: DateTime<Utc>) -> Result<()> {
        self.check_confirm(n)?;
        self.quantity -= n;
        self.reserved -= n;
        self.touch(now);
        Ok(())
    }

    /// Overwrite the quantity.
    ///
    /// # Errors
    ///
    /// See [`Stock::check_quantity_update`].
    pub fn set_quantity(&mut self, new_quantity: i64, now: DateTime<Utc>) -> Result<()> {
        self.check_quantity_update(new_quantity)?;
        self.quantity = new_quantity;
        self.touch(now);
        Ok(())
    }

    /// Bump version and `updated_at`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}

/// Reject zero and negative unit counts on mutating operations.
///
/// # Errors
///
/// Returns [`InventoryError::Validation`] if `n <= 0`.
pub fn ensure_positive(n: i64, field: &str) -> Result<()> {
    if n <= 0 {
        return Err(InventoryError::validation(format!(
            "{field} must be greater than zero"
        )));
    }
    Ok(())
}

/// Reject blank store ids.
///
/// # Errors
///
/// Returns [`InventoryError::Validation`] if the store id is blank.
pub fn ensure_store(store_id: &StoreId) -> Result<()> {
    if store_id.is_blank() {
        return Err(InventoryError::validation("store_id is required"));
    }
    Ok(())
}
