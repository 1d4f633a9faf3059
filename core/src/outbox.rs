//! The event outbox.
//!
//! Every domain mutation appends exactly one [`OutboxEvent`] in the same
//! transaction as the row change, so an event exists if and only if the change
//! committed. The sync engine later drains unsynced events to the broker in
//! `created_at` order and flips `synced` only after a successful publish.
//!
//! # Payload schemas
//!
//! | `event_type` | payload fields |
//! |---|---|
//! | `stock.created` | `product_id`, `store_id`, `initial_quantity` |
//! | `stock.updated` | `product_id`, `store_id`, `old_quantity`, `new_quantity` (+ `old_reserved`, `new_reserved` when holds moved) |
//! | `stock.transferred` | `product_id`, `from_store_id`, `to_store_id`, `quantity` |
//! | `reservation.*` | `reservation_id`, `product_id`, `store_id`, `quantity` |
//!
//! # Idempotency
//!
//! A crash between a successful publish and the mark-synced commit republishes
//! the event with the same [`EventId`]. Consumers deduplicate on it.

use crate::error::{InventoryError, Result};
use crate::ids::{EventId, ProductId, ReservationId, StoreId};
use crate::reservation::Reservation;
use crate::stock::Stock;
use crate::BoxFuture;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Kind of domain change an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// `InitializeStock`
    #[serde(rename = "stock.created")]
    StockCreated,
    /// Quantity or hold change on a stock row
    #[serde(rename = "stock.updated")]
    StockUpdated,
    /// Units moved between stores (emitted from the source side)
    #[serde(rename = "stock.transferred")]
    StockTransferred,
    /// Reservation placed
    #[serde(rename = "reservation.created")]
    ReservationCreated,
    /// Reservation confirmed
    #[serde(rename = "reservation.confirmed")]
    ReservationConfirmed,
    /// Reservation cancelled
    #[serde(rename = "reservation.cancelled")]
    ReservationCancelled,
    /// Reservation expired
    #[serde(rename = "reservation.expired")]
    ReservationExpired,
}

impl EventType {
    /// Dotted wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StockCreated => "stock.created",
            Self::StockUpdated => "stock.updated",
            Self::StockTransferred => "stock.transferred",
            Self::ReservationCreated => "reservation.created",
            Self::ReservationConfirmed => "reservation.confirmed",
            Self::ReservationCancelled => "reservation.cancelled",
            Self::ReservationExpired => "reservation.expired",
        }
    }

    /// Aggregate this event type belongs to.
    #[must_use]
    pub const fn aggregate_type(self) -> AggregateType {
        match self {
            Self::StockCreated | Self::StockUpdated | Self::StockTransferred => {
                AggregateType::Stock
            }
            Self::ReservationCreated
            | Self::ReservationConfirmed
            | Self::ReservationCancelled
            | Self::ReservationExpired => AggregateType::Reservation,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stock.created" => Ok(Self::StockCreated),
            "stock.updated" => Ok(Self::StockUpdated),
            "stock.transferred" => Ok(Self::StockTransferred),
            "reservation.created" => Ok(Self::ReservationCreated),
            "reservation.confirmed" => Ok(Self::ReservationConfirmed),
            "reservation.cancelled" => Ok(Self::ReservationCancelled),
            "reservation.expired" => Ok(Self::ReservationExpired),
            other => Err(InventoryError::infrastructure(format!(
                "unknown event type '{other}'"
            ))),
        }
    }
}

/// Aggregate an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateType {
    /// A stock row
    Stock,
    /// A reservation
    Reservation,
}

impl AggregateType {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Reservation => "reservation",
        }
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateType {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stock" => Ok(Self::Stock),
            "reservation" => Ok(Self::Reservation),
            other => Err(InventoryError::infrastructure(format!(
                "unknown aggregate type '{other}'"
            ))),
        }
    }
}

/// One row of the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Globally unique id, the deduplication key for consumers
    pub id: EventId,
    /// What happened
    pub event_type: EventType,
    /// What it happened to
    pub aggregate_type: AggregateType,
    /// Stock row id or reservation id
    pub aggregate_id: String,
    /// Store the change happened in
    pub store_id: StoreId,
    /// Event-specific fields
    pub payload: Value,
    /// Ordering key for replay
    pub created_at: DateTime<Utc>,
    /// Whether the event reached the broker; never reverts once true
    pub synced: bool,
    /// When the event was marked synced
    pub synced_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    fn new(
        event_type: EventType,
        aggregate_id: String,
        store_id: StoreId,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            aggregate_type: event_type.aggregate_type(),
            aggregate_id,
            store_id,
            payload,
            created_at: now,
            synced: false,
            synced_at: None,
        }
    }

    /// `stock.created` for a freshly initialized row.
    #[must_use]
    pub fn stock_created(stock: &Stock, now: DateTime<Utc>) -> Self {
        Self::new(
            EventType::StockCreated,
            stock.id.to_string(),
            stock.store_id.clone(),
            json!({
                "product_id": stock.product_id,
                "store_id": stock.store_id,
                "initial_quantity": stock.quantity,
            }),
            now,
        )
    }

    /// `stock.updated` describing the change from `before` to `after`.
    ///
    /// The reserved counters are included only when holds moved.
    #[must_use]
    pub fn stock_updated(before: &Stock, after: &Stock, now: DateTime<Utc>) -> Self {
        let mut payload = json!({
            "product_id": after.product_id,
            "store_id": after.store_id,
            "old_quantity": before.quantity,
            "new_quantity": after.quantity,
        });
        if before.reserved != after.reserved {
            if let Some(map) = payload.as_object_mut() {
                map.insert("old_reserved".to_string(), json!(before.reserved));
                map.insert("new_reserved".to_string(), json!(after.reserved));
            }
        }
        Self::new(
            EventType::StockUpdated,
            after.id.to_string(),
            after.store_id.clone(),
            payload,
            now,
        )
    }

    /// `stock.transferred`, attached to the source row.
    #[must_use]
    pub fn stock_transferred(
        source: &Stock,
        to_store_id: &StoreId,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            EventType::StockTransferred,
            source.id.to_string(),
            source.store_id.clone(),
            json!({
                "product_id": source.product_id,
                "from_store_id": source.store_id,
                "to_store_id": to_store_id,
                "quantity": quantity,
            }),
            now,
        )
    }

    /// One of the `reservation.*` events.
    #[must_use]
    pub fn for_reservation(
        event_type: EventType,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            event_type,
            reservation.id.to_string(),
            reservation.store_id.clone(),
            json!({
                "reservation_id": reservation.id,
                "product_id": reservation.product_id,
                "store_id": reservation.store_id,
                "quantity": reservation.quantity,
            }),
            now,
        )
    }

    /// Decode the payload into one of the typed payload structs.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the payload does not match `T`.
    pub fn payload_as<T: serde::de::DeserializeOwned>(
        &self,
    ) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Payload of `stock.created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCreatedPayload {
    /// Product
    pub product_id: ProductId,
    /// Store
    pub store_id: StoreId,
    /// Quantity the row started with
    pub initial_quantity: i64,
}

/// Payload of `stock.updated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdatedPayload {
    /// Product
    pub product_id: ProductId,
    /// Store
    pub store_id: StoreId,
    /// Quantity before the change
    pub old_quantity: i64,
    /// Quantity after the change
    pub new_quantity: i64,
    /// Reserved units before the change, present when holds moved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_reserved: Option<i64>,
    /// Reserved units after the change, present when holds moved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_reserved: Option<i64>,
}

/// Payload of `stock.transferred`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransferredPayload {
    /// Product
    pub product_id: ProductId,
    /// Store the units left
    pub from_store_id: StoreId,
    /// Store the units arrived at
    pub to_store_id: StoreId,
    /// Units moved
    pub quantity: i64,
}

/// Payload of every `reservation.*` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationPayload {
    /// Reservation
    pub reservation_id: ReservationId,
    /// Product
    pub product_id: ProductId,
    /// Store
    pub store_id: StoreId,
    /// Units held
    pub quantity: i64,
}

/// Read and maintenance side of the outbox.
///
/// Appends are not part of this trait: each backend appends inside the
/// transaction of the mutation that produced the event.
pub trait EventOutbox: Send + Sync {
    /// Up to `limit` unsynced events, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Infrastructure`] on storage failure.
    fn fetch_unsynced(&self, limit: usize) -> BoxFuture<'_, Result<Vec<OutboxEvent>>>;

    /// Mark `ids` synced at `at` in one transaction. Already synced ids are
    /// left untouched. Returns how many rows flipped.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Infrastructure`] on storage failure; no id is
    /// marked in that case.
    fn mark_synced(&self, ids: Vec<EventId>, at: DateTime<Utc>) -> BoxFuture<'_, Result<usize>>;

    /// Delete synced events whose `synced_at` is older than `days_old` days.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Infrastructure`] on storage failure.
    fn cleanup_old_events(&self, days_old: u32) -> BoxFuture<'_, Result<u64>>;

    /// All events of one aggregate, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Infrastructure`] on storage failure.
    fn events_for_aggregate(&self, aggregate_id: String)
    -> BoxFuture<'_, Result<Vec<OutboxEvent>>>;

    /// Number of events waiting to be published.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Infrastructure`] on storage failure.
    fn count_unsynced(&self) -> BoxFuture<'_, Result<u64>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn stock(quantity: i64) -> Stock {
        Stock::initialize(ProductId::new(), StoreId::new("s1"), quantity, Utc::now()).unwrap()
    }

    #[test]
    fn event_type_wire_names_round_trip_through_serde() {
        let json = serde_json::to_string(&EventType::StockTransferred).unwrap();
        assert_eq!(json, "\"stock.transferred\"");
        assert_eq!(
            "reservation.expired".parse::<EventType>().unwrap(),
            EventType::ReservationExpired
        );
    }

    #[test]
    fn stock_created_payload_matches_schema() {
        let s = stock(100);
        let event = OutboxEvent::stock_created(&s, Utc::now());
        let payload: StockCreatedPayload = event.payload_as().unwrap();
        assert_eq!(payload.initial_quantity, 100);
        assert_eq!(event.aggregate_type, AggregateType::Stock);
        assert_eq!(event.aggregate_id, s.id.to_string());
        assert!(!event.synced);
    }

    #[test]
    fn stock_updated_includes_reserved_only_when_holds_move() {
        let before = stock(10);
        let mut after = before.clone();
        after.set_quantity(12, Utc::now()).unwrap();
        let plain: StockUpdatedPayload = OutboxEvent::stock_updated(&before, &after, Utc::now())
            .payload_as()
            .unwrap();
        assert_eq!((plain.old_quantity, plain.new_quantity), (10, 12));
        assert_eq!(plain.old_reserved, None);

        let mut held = before.clone();
        held.reserve(4, Utc::now()).unwrap();
        let hold: StockUpdatedPayload = OutboxEvent::stock_updated(&before, &held, Utc::now())
            .payload_as()
            .unwrap();
        assert_eq!((hold.old_reserved, hold.new_reserved), (Some(0), Some(4)));
    }

    #[test]
    fn transferred_payload_names_both_stores() {
        let s = stock(100);
        let event = OutboxEvent::stock_transferred(&s, &StoreId::new("B"), 20, Utc::now());
        let payload: StockTransferredPayload = event.payload_as().unwrap();
        assert_eq!(payload.from_store_id, StoreId::new("s1"));
        assert_eq!(payload.to_store_id, StoreId::new("B"));
        assert_eq!(payload.quantity, 20);
    }
}
