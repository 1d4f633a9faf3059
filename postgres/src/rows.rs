//! Row structs and their conversion into domain types.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use stockroom_core::{
    CustomerId, EventId, InventoryError, OutboxEvent, Product, ProductId, Reservation,
    ReservationId, Stock, StockId, StoreId,
};
use uuid::Uuid;

/// Column list shared by every `stock` query.
macro_rules! stock_columns {
    () => {
        "id, product_id, store_id, quantity, reserved, version, created_at, updated_at"
    };
}

/// Column list shared by every `reservations` query.
macro_rules! reservation_columns {
    () => {
        "id, product_id, store_id, customer_id, quantity, status, expires_at, created_at, updated_at"
    };
}

/// Column list shared by every `events` query.
macro_rules! event_columns {
    () => {
        "id, event_type, aggregate_type, aggregate_id, store_id, payload, created_at, synced, synced_at"
    };
}

/// Column list shared by every `products` query.
macro_rules! product_columns {
    () => {
        "id, sku, name, category, price, created_at, updated_at"
    };
}

pub(crate) use {event_columns, product_columns, reservation_columns, stock_columns};

#[derive(FromRow)]
pub(crate) struct StockRow {
    id: Uuid,
    product_id: Uuid,
    store_id: String,
    quantity: i64,
    reserved: i64,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StockRow> for Stock {
    fn from(row: StockRow) -> Self {
        Self {
            id: StockId::from_uuid(row.id),
            product_id: ProductId::from_uuid(row.product_id),
            store_id: StoreId::new(row.store_id),
            quantity: row.quantity,
            reserved: row.reserved,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
pub(crate) struct ReservationRow {
    id: Uuid,
    product_id: Uuid,
    store_id: String,
    customer_id: String,
    quantity: i64,
    status: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = InventoryError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|_| {
            InventoryError::infrastructure(format!("Invalid reservation status: {}", row.status))
        })?;
        Ok(Self {
            id: ReservationId::from_uuid(row.id),
            product_id: ProductId::from_uuid(row.product_id),
            store_id: StoreId::new(row.store_id),
            customer_id: CustomerId::new(row.customer_id),
            quantity: row.quantity,
            status,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct EventRow {
    id: Uuid,
    event_type: String,
    aggregate_type: String,
    aggregate_id: String,
    store_id: String,
    payload: sqlx::types::Json<serde_json::Value>,
    created_at: DateTime<Utc>,
    synced: bool,
    synced_at: Option<DateTime<Utc>>,
}

impl TryFrom<EventRow> for OutboxEvent {
    type Error = InventoryError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: EventId::from_uuid(row.id),
            event_type: row.event_type.parse()?,
            aggregate_type: row.aggregate_type.parse()?,
            aggregate_id: row.aggregate_id,
            store_id: StoreId::new(row.store_id),
            payload: row.payload.0,
            created_at: row.created_at,
            synced: row.synced,
            synced_at: row.synced_at,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    category: String,
    price: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::from_uuid(row.id),
            sku: row.sku,
            name: row.name,
            category: row.category,
            price: row.price,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Convert a batch of rows, failing on the first malformed one.
pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, InventoryError>
where
    T: TryFrom<R, Error = InventoryError>,
{
    rows.into_iter().map(T::try_from).collect()
}
