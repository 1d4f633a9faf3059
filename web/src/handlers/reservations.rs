//! Reservation endpoints.
//!
//! - POST /reservations - Hold units for a customer
//! - GET /reservations/:id - Read a reservation
//! - POST /reservations/:id/confirm - Convert the hold into a sale
//! - POST /reservations/:id/cancel - Give the units back
//! - GET /reservations/stats - Counts grouped by status
//! - GET /customers/:id/reservations - A customer's reservations, newest first

use crate::error::AppError;
use crate::extractors::{CorrelationId, IdPath, JsonBody};
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use chrono::Duration;
use serde::Deserialize;
use stockroom_core::{
    CustomerId, NewReservation, ProductId, Reservation, ReservationId, ReservationStats, StoreId,
};

/// Request to create a reservation.
#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    /// Product to hold
    pub product_id: ProductId,
    /// Store to hold it in
    pub store_id: StoreId,
    /// Holder; a missing or blank id is rejected
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    /// Units to hold
    pub quantity: i64,
    /// Minutes until the hold expires; the configured default when absent
    #[serde(default)]
    pub ttl_minutes: Option<i64>,
}

impl CreateReservationRequest {
    fn into_new_reservation(self, default_ttl: Duration) -> Result<NewReservation, AppError> {
        let customer_id = self
            .customer_id
            .ok_or_else(|| AppError::validation("customer_id is required"))?;
        let ttl = match self.ttl_minutes {
            Some(minutes) => Duration::try_minutes(minutes)
                .ok_or_else(|| AppError::validation("ttl_minutes is out of range"))?,
            None => default_ttl,
        };
        Ok(NewReservation {
            product_id: self.product_id,
            store_id: self.store_id,
            customer_id,
            quantity: self.quantity,
            ttl,
        })
    }
}

/// Create a reservation. Responds `201 Created`.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/reservations \
///   -H "Content-Type: application/json" \
///   -d '{"product_id":"…","store_id":"s1","customer_id":"c-42","quantity":2,"ttl_minutes":15}'
/// ```
pub async fn create_reservation(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    JsonBody(request): JsonBody<CreateReservationRequest>,
) -> Result<(StatusCode, Json<Reservation>), AppError> {
    let request = request.into_new_reservation(state.default_ttl)?;
    let reservation = state.reservations.create_reservation(request).await?;
    tracing::info!(
        correlation_id = %correlation_id.0,
        reservation_id = %reservation.id,
        quantity = reservation.quantity,
        "Reservation created"
    );
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// Read one reservation.
pub async fn get_reservation(
    State(state): State<AppState>,
    IdPath(id): IdPath<ReservationId>,
) -> Result<Json<Reservation>, AppError> {
    Ok(Json(state.reservations.get_reservation(id).await?))
}

/// Confirm a pending reservation.
pub async fn confirm_reservation(
    State(state): State<AppState>,
    IdPath(id): IdPath<ReservationId>,
) -> Result<Json<Reservation>, AppError> {
    Ok(Json(state.reservations.confirm_reservation(id).await?))
}

/// Cancel a pending reservation.
pub async fn cancel_reservation(
    State(state): State<AppState>,
    IdPath(id): IdPath<ReservationId>,
) -> Result<Json<Reservation>, AppError> {
    Ok(Json(state.reservations.cancel_reservation(id).await?))
}

/// Reservation counts grouped by status.
pub async fn reservation_stats(
    State(state): State<AppState>,
) -> Result<Json<ReservationStats>, AppError> {
    Ok(Json(state.reservations.reservation_stats().await?))
}

/// A customer's reservations, newest first.
pub async fn list_by_customer(
    State(state): State<AppState>,
    IdPath(customer_id): IdPath<CustomerId>,
) -> Result<Json<Vec<Reservation>>, AppError> {
    Ok(Json(
        state
            .reservations
            .list_reservations_by_customer(customer_id)
            .await?,
    ))
}
