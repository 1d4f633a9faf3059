//! Error taxonomy shared by every storage backend.
//!
//! All ledger, reservation, catalog and outbox operations fail with an
//! [`InventoryError`]. Callers that need to branch on the category (HTTP status
//! mapping, metric labels, retry decisions) use [`InventoryError::kind`].

use crate::ids::ReservationId;
use crate::reservation::ReservationStatus;
use thiserror::Error;

/// Errors returned by inventory operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Malformed or out-of-range input. User-correctable.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A referenced aggregate does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up (`product`, `stock`, `reservation`)
        entity: &'static str,
        /// The identifier that was looked up
        id: String,
    },

    /// Optimistic lock miss or a conditional update that affected zero rows.
    ///
    /// Retriable at the caller's discretion.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Not enough available units to place a hold.
    #[error("Insufficient stock: available {available}, requested {requested}")]
    InsufficientStock {
        /// Units available at the time of the check
        available: i64,
        /// Units the caller asked for
        requested: i64,
    },

    /// A reservation transition was attempted from a non-permitted state.
    #[error("Reservation {reservation_id} is {status}, expected PENDING")]
    InvalidState {
        /// The reservation that was targeted
        reservation_id: ReservationId,
        /// Its current status
        status: ReservationStatus,
    },

    /// Confirm attempted after the reservation deadline.
    #[error("Reservation {0} has expired")]
    ReservationExpired(ReservationId),

    /// Database or broker transport failure.
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

/// Copyable discriminant of [`InventoryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`InventoryError::Validation`]
    Validation,
    /// See [`InventoryError::NotFound`]
    NotFound,
    /// See [`InventoryError::Conflict`]
    Conflict,
    /// See [`InventoryError::InsufficientStock`]
    InsufficientStock,
    /// See [`InventoryError::InvalidState`]
    InvalidState,
    /// See [`InventoryError::ReservationExpired`]
    ReservationExpired,
    /// See [`InventoryError::Infrastructure`]
    Infrastructure,
}

impl ErrorKind {
    /// Stable snake_case label, used for metrics and API error codes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::InsufficientStock => "insufficient_stock",
            Self::InvalidState => "invalid_state",
            Self::ReservationExpired => "reservation_expired",
            Self::Infrastructure => "infrastructure",
        }
    }
}

impl InventoryError {
    /// Category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::ReservationExpired(_) => ErrorKind::ReservationExpired,
            Self::Infrastructure(_) => ErrorKind::Infrastructure,
        }
    }

    /// Shorthand for [`InventoryError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for [`InventoryError::Conflict`].
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Shorthand for [`InventoryError::Infrastructure`].
    pub fn infrastructure(msg: impl Into<String>) -> Self {
        Self::Infrastructure(msg.into())
    }

    /// A missing product.
    pub fn product_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "product",
            id: id.to_string(),
        }
    }

    /// A missing `(product, store)` stock row.
    pub fn stock_not_found(product_id: impl ToString, store_id: impl ToString) -> Self {
        Self::NotFound {
            entity: "stock",
            id: format!("{}/{}", product_id.to_string(), store_id.to_string()),
        }
    }

    /// A missing reservation.
    pub fn reservation_not_found(id: ReservationId) -> Self {
        Self::NotFound {
            entity: "reservation",
            id: id.to_string(),
        }
    }
}

/// Convenience alias used by every storage trait.
pub type Result<T> = std::result::Result<T, InventoryError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_display_carries_counts() {
        let err = InventoryError::InsufficientStock {
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock: available 3, requested 5"
        );
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
    }

    #[test]
    fn invalid_state_names_status() {
        let id = ReservationId::new();
        let err = InventoryError::InvalidState {
            reservation_id: id,
            status: ReservationStatus::Confirmed,
        };
        assert!(err.to_string().contains("CONFIRMED"));
        assert_eq!(err.kind().as_str(), "invalid_state");
    }

    #[test]
    fn stock_not_found_joins_key() {
        let err = InventoryError::stock_not_found("p", "s1");
        assert_eq!(err.to_string(), "stock not found: p/s1");
    }
}
