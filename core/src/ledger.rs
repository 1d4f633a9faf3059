//! The stock ledger capability.
//!
//! Every successful mutation appends exactly one outbox event in the same
//! transaction as the row change:
//!
//! | Operation | Event |
//! |---|---|
//! | `initialize_stock` | `stock.created` |
//! | `update_quantity`, `adjust_stock` | `stock.updated` |
//! | `reserve_stock`, `release_reserved_stock`, `confirm_reserved_stock` | `stock.updated` |
//! | `transfer_stock` | `stock.transferred` (source side) |
//!
//! Hot paths lock the target row (`SELECT ... FOR UPDATE` on PostgreSQL).
//! `update_quantity` is a blind write guarded by the row version instead.
//! When two rows are touched they are locked in `(product_id, store_id)`
//! ascending order.

use crate::error::{InventoryError, Result};
use crate::ids::{ProductId, StoreId};
use crate::stock::Stock;
use crate::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How `transfer_stock` spans the two rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Two transactions: decrement the source, then increment the destination.
    /// A failed destination step triggers a best-effort compensating increment
    /// on the source.
    #[default]
    Compensating,
    /// One transaction that locks both rows in key order.
    Atomic,
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compensating => f.write_str("compensating"),
            Self::Atomic => f.write_str("atomic"),
        }
    }
}

impl FromStr for TransferMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compensating" => Ok(Self::Compensating),
            "atomic" => Ok(Self::Atomic),
            other => Err(format!(
                "unknown transfer mode '{other}' (expected 'compensating' or 'atomic')"
            )),
        }
    }
}

/// Both rows after a successful transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Row the units left
    pub source: Stock,
    /// Row the units arrived at
    pub destination: Stock,
}

/// Validate the arguments of a transfer before touching storage.
///
/// # Errors
///
/// Returns [`InventoryError::Validation`] if `n <= 0`, a store id is blank, or
/// the two stores are the same.
pub fn validate_transfer(from: &StoreId, to: &StoreId, n: i64) -> Result<()> {
    crate::stock::ensure_positive(n, "quantity")?;
    crate::stock::ensure_store(from)?;
    crate::stock::ensure_store(to)?;
    if from == to {
        return Err(InventoryError::validation(
            "source and destination store must differ",
        ));
    }
    Ok(())
}

/// Transactional operations on `(product, store)` stock rows.
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so that backends can be shared as `Arc<dyn StockLedger>`.
pub trait StockLedger: Send + Sync {
    /// Create the row for `(product_id, store_id)` with `initial_quantity` on hand.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Validation`] if `initial_quantity < 0`
    /// - [`InventoryError::NotFound`] if the product does not exist
    /// - [`InventoryError::Conflict`] if the row already exists
    fn initialize_stock(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        initial_quantity: i64,
    ) -> BoxFuture<'_, Result<Stock>>;

    /// Read the committed row.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::NotFound`] if absent.
    fn get_stock(&self, product_id: ProductId, store_id: StoreId)
    -> BoxFuture<'_, Result<Stock>>;

    /// All rows of a store, ordered by product.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Infrastructure`] on storage failure.
    fn list_stock_by_store(&self, store_id: StoreId) -> BoxFuture<'_, Result<Vec<Stock>>>;

    /// All rows of a product, ordered by store.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Infrastructure`] on storage failure.
    fn list_stock_by_product(&self, product_id: ProductId)
    -> BoxFuture<'_, Result<Vec<Stock>>>;

    /// Blind overwrite of the on-hand quantity, guarded by the row version.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Validation`] if `new_quantity < 0` or below `reserved`
    /// - [`InventoryError::NotFound`] if the row is absent
    /// - [`InventoryError::Conflict`] if the version moved underneath; refetch and retry
    fn update_quantity(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        new_quantity: i64,
    ) -> BoxFuture<'_, Result<Stock>>;

    /// Add `delta` (positive or negative) to the on-hand quantity under a row lock.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Validation`] if `delta == 0` or the result would be
    ///   negative or below `reserved`
    /// - [`InventoryError::NotFound`] if the row is absent
    fn adjust_stock(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        delta: i64,
    ) -> BoxFuture<'_, Result<Stock>>;

    /// Hold `n` units. The only operation that reports insufficient stock.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Validation`] if `n <= 0`
    /// - [`InventoryError::NotFound`] if the row is absent
    /// - [`InventoryError::InsufficientStock`] if `available < n`
    fn reserve_stock(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        n: i64,
    ) -> BoxFuture<'_, Result<Stock>>;

    /// Return `n` held units to the available pool.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Validation`] if `n <= 0`
    /// - [`InventoryError::Conflict`] if fewer than `n` units are held
    fn release_reserved_stock(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        n: i64,
    ) -> BoxFuture<'_, Result<Stock>>;

    /// Convert `n` held units into a sale (both counters drop by `n`).
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Validation`] if `n <= 0`
    /// - [`InventoryError::Conflict`] unless `quantity >= n` and `reserved >= n`
    fn confirm_reserved_stock(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        n: i64,
    ) -> BoxFuture<'_, Result<Stock>>;

    /// Move `n` available units between two existing rows of the same product.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Validation`] for `n <= 0` or `from == to`
    /// - [`InventoryError::NotFound`] if either row is absent
    /// - [`InventoryError::Conflict`] if the source has fewer than `n` available
    /// - [`InventoryError::Infrastructure`] if the destination step and its
    ///   compensation both failed
    fn transfer_stock(
        &self,
        product_id: ProductId,
        from_store_id: StoreId,
        to_store_id: StoreId,
        n: i64,
    ) -> BoxFuture<'_, Result<Transfer>>;

    /// Whether at least `n` units are available right now.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Validation`] if `n <= 0`
    /// - [`InventoryError::NotFound`] if the row is absent
    fn check_availability(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        n: i64,
    ) -> BoxFuture<'_, Result<bool>>;

    /// Rows whose available units are at or below `threshold`, lowest first.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Validation`] if `threshold < 0`.
    fn low_stock_items(&self, threshold: i64) -> BoxFuture<'_, Result<Vec<Stock>>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn transfer_mode_parses_case_insensitively() {
        assert_eq!("ATOMIC".parse::<TransferMode>().unwrap(), TransferMode::Atomic);
        assert_eq!(
            "compensating".parse::<TransferMode>().unwrap(),
            TransferMode::Compensating
        );
        assert!("eventual".parse::<TransferMode>().is_err());
    }

    #[test]
    fn transfer_to_same_store_is_rejected() {
        let s = StoreId::new("a");
        assert!(matches!(
            validate_transfer(&s, &s, 1),
            Err(InventoryError::Validation(_))
        ));
        assert!(validate_transfer(&s, &StoreId::new("b"), 0).is_err());
        assert!(validate_transfer(&s, &StoreId::new("b"), 1).is_ok());
    }
}
