//! Reservation state machine.
//!
//! ```text
//!                  create                confirm
//!   (none) ─────────────────▶ PENDING ───────────▶ CONFIRMED
//!                                │   cancel
//!                                ├───────────▶ CANCELLED
//!                                │   expire
//!                                └───────────▶ EXPIRED
//! ```
//!
//! Terminal states are absorbing. Each transition out of `PENDING` is paired
//! with a ledger operation in the same transaction:
//!
//! - confirm: held units become a sale (`quantity -= n`, `reserved -= n`)
//! - cancel / expire: held units return to the pool (`reserved -= n`)
//!
//! The wire spelling of statuses is the uppercase token; any other spelling is
//! rejected.

use crate::error::{InventoryError, Result};
use crate::ids::{CustomerId, ProductId, ReservationId, StoreId};
use crate::BoxFuture;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReservationStatus {
    /// Units are held
    Pending,
    /// Units were sold
    Confirmed,
    /// Hold released on request
    Cancelled,
    /// Hold released after the deadline passed
    Expired,
}

impl ReservationStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 4] = [
        Self::Pending,
        Self::Confirmed,
        Self::Cancelled,
        Self::Expired,
    ];

    /// Uppercase token stored in the database and sent over the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Whether no further transition is permitted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "CANCELLED" => Ok(Self::Cancelled),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(InventoryError::validation(format!(
                "unknown reservation status '{other}'"
            ))),
        }
    }
}

/// A time-bound hold on stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation identifier
    pub id: ReservationId,
    /// Product held
    pub product_id: ProductId,
    /// Store the units are held in
    pub store_id: StoreId,
    /// Customer holding the units
    pub customer_id: CustomerId,
    /// Units held, always positive
    pub quantity: i64,
    /// Current status
    pub status: ReservationStatus,
    /// Deadline after which a pending hold is reaped
    pub expires_at: DateTime<Utc>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last transition time
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Whether the deadline has passed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Require `PENDING`.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::InvalidState`] for any terminal status.
    pub fn ensure_pending(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(InventoryError::InvalidState {
                reservation_id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    /// Require `PENDING` and not past the deadline.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::InvalidState`] for any terminal status
    /// - [`InventoryError::ReservationExpired`] if the deadline has passed; the
    ///   row stays `PENDING` for the expiration worker
    pub fn ensure_confirmable(&self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_pending()?;
        if self.is_expired_at(now) {
            return Err(InventoryError::ReservationExpired(self.id));
        }
        Ok(())
    }

    /// Move from `PENDING` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::InvalidState`] if not `PENDING`.
    pub fn transition(&mut self, to: ReservationStatus, now: DateTime<Utc>) -> Result<()> {
        self.ensure_pending()?;
        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}

/// Input for `create_reservation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    /// Product to hold
    pub product_id: ProductId,
    /// Store to hold it in
    pub store_id: StoreId,
    /// Holder, required
    pub customer_id: CustomerId,
    /// Units to hold
    pub quantity: i64,
    /// Time until the hold expires
    pub ttl: Duration,
}

impl NewReservation {
    /// Check field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Validation`] for a non-positive quantity or
    /// ttl, or a blank store or customer id.
    pub fn validate(&self) -> Result<()> {
        crate::stock::ensure_positive(self.quantity, "quantity")?;
        crate::stock::ensure_store(&self.store_id)?;
        if self.customer_id.is_blank() {
            return Err(InventoryError::validation("customer_id is required"));
        }
        if self.ttl <= Duration::zero() {
            return Err(InventoryError::validation("ttl must be greater than zero"));
        }
        Ok(())
    }

    /// Build the `PENDING` row at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Validation`] if `now + ttl` is not a
    /// representable timestamp.
    pub fn into_reservation(self, now: DateTime<Utc>) -> Result<Reservation> {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| InventoryError::validation("ttl is too large"))?;
        Ok(Reservation {
            id: ReservationId::new(),
            product_id: self.product_id,
            store_id: self.store_id,
            customer_id: self.customer_id,
            quantity: self.quantity,
            status: ReservationStatus::Pending,
            expires_at,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Result of `expire_reservation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpireOutcome {
    /// The row moved to `EXPIRED` and its units were released
    Expired,
    /// The row was already terminal; nothing changed
    AlreadyTerminal,
    /// The row is `PENDING` but its deadline has not passed; nothing changed
    NotDue,
}

/// Reservation counts grouped by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationStats {
    /// `PENDING` rows
    pub pending: u64,
    /// `CONFIRMED` rows
    pub confirmed: u64,
    /// `CANCELLED` rows
    pub cancelled: u64,
    /// `EXPIRED` rows
    pub expired: u64,
    /// All rows
    pub total: u64,
}

impl ReservationStats {
    /// Add `count` rows of `status`.
    pub fn add(&mut self, status: ReservationStatus, count: u64) {
        match status {
            ReservationStatus::Pending => self.pending += count,
            ReservationStatus::Confirmed => self.confirmed += count,
            ReservationStatus::Cancelled => self.cancelled += count,
            ReservationStatus::Expired => self.expired += count,
        }
        self.total += count;
    }
}

/// The reservation lifecycle.
///
/// Implementations run each transition and its ledger operation in one
/// transaction and perform no compensating writes.
pub trait ReservationManager: Send + Sync {
    /// Hold stock and insert a `PENDING` row expiring at `now + ttl`.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Validation`] for invalid input
    /// - [`InventoryError::NotFound`] if the product or stock row is absent
    /// - [`InventoryError::InsufficientStock`] if not enough units are available
    fn create_reservation(&self, request: NewReservation) -> BoxFuture<'_, Result<Reservation>>;

    /// Fetch a reservation.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::NotFound`] if absent.
    fn get_reservation(&self, id: ReservationId) -> BoxFuture<'_, Result<Reservation>>;

    /// Reservations of a customer, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Infrastructure`] on storage failure.
    fn list_reservations_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> BoxFuture<'_, Result<Vec<Reservation>>>;

    /// `PENDING` → `CONFIRMED`, converting the held units into a sale.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] if absent
    /// - [`InventoryError::InvalidState`] if not `PENDING`
    /// - [`InventoryError::ReservationExpired`] if past the deadline
    /// - [`InventoryError::Conflict`] if the ledger condition fails
    fn confirm_reservation(&self, id: ReservationId) -> BoxFuture<'_, Result<Reservation>>;

    /// `PENDING` → `CANCELLED`, releasing the held units.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] if absent
    /// - [`InventoryError::InvalidState`] if not `PENDING`
    /// - [`InventoryError::Conflict`] if the ledger condition fails
    fn cancel_reservation(&self, id: ReservationId) -> BoxFuture<'_, Result<Reservation>>;

    /// `PENDING` → `EXPIRED` if the deadline has passed. Idempotent.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] if absent
    /// - [`InventoryError::Conflict`] if the ledger condition fails
    fn expire_reservation(&self, id: ReservationId) -> BoxFuture<'_, Result<ExpireOutcome>>;

    /// Expire every `PENDING` row past its deadline. Per-row failures are
    /// logged and skipped. Returns how many rows moved to `EXPIRED`.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Infrastructure`] if the candidate scan fails.
    fn process_expired_reservations(&self) -> BoxFuture<'_, Result<usize>>;

    /// Counts grouped by status.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Infrastructure`] on storage failure.
    fn reservation_stats(&self) -> BoxFuture<'_, Result<ReservationStats>>;

    /// Delete terminal reservations last updated before `older_than`.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Infrastructure`] on storage failure.
    fn purge_terminal_reservations(
        &self,
        older_than: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<u64>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn request() -> NewReservation {
        NewReservation {
            product_id: ProductId::new(),
            store_id: StoreId::new("s1"),
            customer_id: CustomerId::new("c1"),
            quantity: 2,
            ttl: Duration::minutes(15),
        }
    }

    #[test]
    fn status_tokens_are_uppercase_only() {
        assert_eq!(
            "PENDING".parse::<ReservationStatus>().unwrap(),
            ReservationStatus::Pending
        );
        assert!("pending".parse::<ReservationStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&ReservationStatus::Cancelled).unwrap(),
            "\"CANCELLED\""
        );
        assert!(serde_json::from_str::<ReservationStatus>("\"expired\"").is_err());
    }

    #[test]
    fn missing_customer_is_validation_error() {
        let mut r = request();
        r.customer_id = CustomerId::new("");
        assert!(matches!(r.validate(), Err(InventoryError::Validation(_))));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let mut r = request();
        r.ttl = Duration::zero();
        assert!(r.validate().is_err());
    }

    #[test]
    fn ttl_past_the_calendar_is_validation_error() {
        let mut r = request();
        r.ttl = Duration::try_minutes(1_000_000_000_000).unwrap();
        assert!(r.validate().is_ok());
        assert!(matches!(
            r.into_reservation(Utc::now()),
            Err(InventoryError::Validation(_))
        ));
    }

    #[test]
    fn terminal_states_are_absorbing() {
        let now = Utc::now();
        let mut res = request().into_reservation(now).unwrap();
        res.transition(ReservationStatus::Cancelled, now).unwrap();
        let err = res
            .transition(ReservationStatus::Confirmed, now)
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::InvalidState {
                status: ReservationStatus::Cancelled,
                ..
            }
        ));
    }

    #[test]
    fn confirm_after_deadline_is_expired_error() {
        let now = Utc::now();
        let res = request().into_reservation(now).unwrap();
        assert!(res.ensure_confirmable(now).is_ok());
        let later = now + Duration::minutes(16);
        assert_eq!(
            res.ensure_confirmable(later),
            Err(InventoryError::ReservationExpired(res.id))
        );
    }

    #[test]
    fn stats_accumulate_total() {
        let mut stats = ReservationStats::default();
        stats.add(ReservationStatus::Pending, 3);
        stats.add(ReservationStatus::Expired, 2);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.expired, 2);
    }
}
