//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health. Neither requires an API key.

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
}

/// Simple health check endpoint (for basic liveness).
///
/// Returns 200 OK to indicate the service is running.
/// This endpoint does NOT check dependencies (database, etc.).
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Overall readiness status
    pub ready: bool,
    /// Storage reachability
    pub storage: bool,
    /// Unsynced events, when storage answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_events: Option<u64>,
}

/// Readiness check endpoint.
///
/// Runs a cheap storage query (the outbox backlog count).
///
/// # Status Codes
///
/// - 200 OK: storage answered
/// - 503 Service Unavailable: storage failed
pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    match state.outbox.count_unsynced().await {
        Ok(pending) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                ready: true,
                storage: true,
                pending_events: Some(pending),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    ready: false,
                    storage: false,
                    pending_events: None,
                }),
            )
        }
    }
}
