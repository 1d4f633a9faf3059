//! Stock ledger endpoints.
//!
//! - POST /stock - Initialize a `(product, store)` row
//! - GET /stock/:product_id/:store_id - Read a row
//! - PUT /stock/:product_id/:store_id - Overwrite the quantity
//! - POST /stock/:product_id/:store_id/adjust - Apply a signed delta
//! - GET /stock/:product_id/:store_id/availability?quantity=n - Check availability
//! - POST /stock/transfer - Move units between stores
//! - GET /stock/low-stock?threshold=t - Rows with few available units
//! - GET /stock/store/:id - Rows of one store
//! - GET /stock/product/:id - Rows of one product

use crate::error::AppError;
use crate::extractors::{CorrelationId, IdPath, JsonBody, QueryParams, StockKey};
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use stockroom_core::{ProductId, Stock, StoreId, Transfer};

/// Threshold used by the low-stock listing when the query omits one.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

/// Request to initialize a stock row.
#[derive(Debug, Deserialize)]
pub struct InitializeStockRequest {
    /// Product
    pub product_id: ProductId,
    /// Store
    pub store_id: StoreId,
    /// Units on hand
    pub initial_quantity: i64,
}

/// Request to overwrite a row's quantity.
#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    /// New units on hand
    pub quantity: i64,
}

/// Request to apply a signed delta.
#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    /// Units to add (positive) or remove (negative)
    pub adjustment: i64,
}

/// Request to move units between stores.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    /// Product
    pub product_id: ProductId,
    /// Store the units leave
    pub from_store_id: StoreId,
    /// Store the units arrive at
    pub to_store_id: StoreId,
    /// Units to move
    pub quantity: i64,
}

/// Query of the availability check.
#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    /// Units wanted
    pub quantity: i64,
}

/// Availability check result.
#[derive(Debug, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    /// Product
    pub product_id: ProductId,
    /// Store
    pub store_id: StoreId,
    /// Units asked about
    pub requested: i64,
    /// Whether that many units can be reserved now
    pub available: bool,
}

/// Query of the low-stock listing.
#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    /// Rows with at most this many available units are listed
    pub threshold: Option<i64>,
}

/// Initialize a stock row. Responds `201 Created`.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/stock \
///   -H "Content-Type: application/json" \
///   -d '{"product_id":"…","store_id":"s1","initial_quantity":100}'
/// ```
pub async fn initialize_stock(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    JsonBody(request): JsonBody<InitializeStockRequest>,
) -> Result<(StatusCode, Json<Stock>), AppError> {
    tracing::debug!(
        correlation_id = %correlation_id.0,
        product_id = %request.product_id,
        store_id = %request.store_id,
        "Initializing stock"
    );
    let stock = state
        .ledger
        .initialize_stock(request.product_id, request.store_id, request.initial_quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(stock)))
}

/// Read one stock row.
pub async fn get_stock(
    State(state): State<AppState>,
    key: StockKey,
) -> Result<Json<Stock>, AppError> {
    let stock = state.ledger.get_stock(key.product_id, key.store_id).await?;
    Ok(Json(stock))
}

/// Overwrite a row's quantity.
pub async fn update_quantity(
    State(state): State<AppState>,
    key: StockKey,
    JsonBody(request): JsonBody<UpdateQuantityRequest>,
) -> Result<Json<Stock>, AppError> {
    let stock = state
        .ledger
        .update_quantity(key.product_id, key.store_id, request.quantity)
        .await?;
    Ok(Json(stock))
}

/// Apply a signed delta to a row's quantity.
pub async fn adjust_stock(
    State(state): State<AppState>,
    key: StockKey,
    JsonBody(request): JsonBody<AdjustStockRequest>,
) -> Result<Json<Stock>, AppError> {
    let stock = state
        .ledger
        .adjust_stock(key.product_id, key.store_id, request.adjustment)
        .await?;
    Ok(Json(stock))
}

/// Check whether `quantity` units can be reserved now.
pub async fn check_availability(
    State(state): State<AppState>,
    key: StockKey,
    QueryParams(query): QueryParams<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let available = state
        .ledger
        .check_availability(key.product_id, key.store_id.clone(), query.quantity)
        .await?;
    Ok(Json(AvailabilityResponse {
        product_id: key.product_id,
        store_id: key.store_id,
        requested: query.quantity,
        available,
    }))
}

/// Move units from one store to another.
pub async fn transfer_stock(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    JsonBody(request): JsonBody<TransferRequest>,
) -> Result<Json<Transfer>, AppError> {
    tracing::info!(
        correlation_id = %correlation_id.0,
        product_id = %request.product_id,
        from = %request.from_store_id,
        to = %request.to_store_id,
        quantity = request.quantity,
        "Transfer requested"
    );
    let transfer = state
        .ledger
        .transfer_stock(
            request.product_id,
            request.from_store_id,
            request.to_store_id,
            request.quantity,
        )
        .await?;
    Ok(Json(transfer))
}

/// List rows whose available units are at or below the threshold.
pub async fn low_stock(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<LowStockQuery>,
) -> Result<Json<Vec<Stock>>, AppError> {
    let threshold = query.threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD);
    Ok(Json(state.ledger.low_stock_items(threshold).await?))
}

/// List the rows of one store.
pub async fn list_by_store(
    State(state): State<AppState>,
    IdPath(store_id): IdPath<StoreId>,
) -> Result<Json<Vec<Stock>>, AppError> {
    Ok(Json(state.ledger.list_stock_by_store(store_id).await?))
}

/// List the rows of one product across stores.
pub async fn list_by_product(
    State(state): State<AppState>,
    IdPath(product_id): IdPath<ProductId>,
) -> Result<Json<Vec<Stock>>, AppError> {
    Ok(Json(state.ledger.list_stock_by_product(product_id).await?))
}
