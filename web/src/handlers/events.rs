//! Outbox inspection for operators.
//!
//! - GET /events/aggregate/:id - Events of one stock row or reservation, in replay order
//! - GET /events/pending-count - Events not yet handed to the broker

use crate::error::AppError;
use crate::extractors::IdPath;
use crate::state::AppState;
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use stockroom_core::OutboxEvent;

/// Backlog size.
#[derive(Debug, Serialize, Deserialize)]
pub struct PendingCountResponse {
    /// Unsynced events
    pub pending: u64,
}

/// Events of one aggregate, oldest first.
pub async fn events_for_aggregate(
    State(state): State<AppState>,
    IdPath(aggregate_id): IdPath<String>,
) -> Result<Json<Vec<OutboxEvent>>, AppError> {
    Ok(Json(state.outbox.events_for_aggregate(aggregate_id).await?))
}

/// Number of events waiting for the sync worker.
pub async fn pending_count(
    State(state): State<AppState>,
) -> Result<Json<PendingCountResponse>, AppError> {
    let pending = state.outbox.count_unsynced().await?;
    Ok(Json(PendingCountResponse { pending }))
}
