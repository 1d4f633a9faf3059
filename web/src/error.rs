//! Error types for web handlers.
//!
//! [`AppError`] bridges the inventory error taxonomy and HTTP responses:
//!
//! | Error | Status |
//! |---|---|
//! | `Validation` | 400 |
//! | missing or unknown API key | 401 |
//! | `NotFound` | 404 |
//! | `Conflict`, `InsufficientStock`, `InvalidState`, `ReservationExpired` | 409 |
//! | `Infrastructure`, anything else | 500 |

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use stockroom_core::InventoryError;

/// Application error type for web handlers.
///
/// Implements Axum's `IntoResponse`, so handlers return
/// `Result<_, AppError>` and use `?` on inventory calls.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Stock>, AppError> {
///     let stock = state.ledger.get_stock(product_id, store_id).await?;
///     Ok(Json(stock))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: &'static str,
    /// Structured fields clients can act on
    details: Option<Value>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: &'static str) -> Self {
        Self {
            status,
            message,
            code,
            details: None,
            source: None,
        }
    }

    /// Attach the error that caused this one.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Attach structured details to the response body.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Create a 400 Bad Request error for malformed input.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "VALIDATION_ERROR")
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message.into(), "UNAUTHORIZED")
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND",
        )
    }

    /// Create a 409 Conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message.into(), "CONFLICT")
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR",
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE",
        )
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Stable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<InventoryError> for AppError {
    fn from(err: InventoryError) -> Self {
        metrics::counter!("stockroom_http_errors_total", "kind" => err.kind().as_str())
            .increment(1);
        match err {
            InventoryError::Validation(message) => Self::validation(message),
            InventoryError::NotFound { entity, id } => Self::not_found(entity, id),
            InventoryError::Conflict(message) => Self::conflict(message),
            InventoryError::InsufficientStock {
                available,
                requested,
            } => Self::new(
                StatusCode::CONFLICT,
                err.to_string(),
                "INSUFFICIENT_STOCK",
            )
            .with_details(json!({ "available": available, "requested": requested })),
            InventoryError::InvalidState {
                reservation_id,
                status,
            } => Self::new(StatusCode::CONFLICT, err.to_string(), "INVALID_STATE")
                .with_details(json!({ "reservation_id": reservation_id, "status": status })),
            InventoryError::ReservationExpired(_) => {
                Self::new(StatusCode::CONFLICT, err.to_string(), "RESERVATION_EXPIRED")
            }
            InventoryError::Infrastructure(_) => {
                Self::internal("An internal error occurred").with_source(err.into())
            }
        }
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: &'static str,
    /// Human-readable error message.
    message: String,
    /// Structured fields, when the error carries any.
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Internal server error"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };

        (self.status, Json(body)).into_response()
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

/// Response for a failure raised by a tower layer rather than a handler.
/// A request past its deadline answers `500`.
pub async fn middleware_error(error: tower::BoxError) -> AppError {
    if error.is::<tower::timeout::error::Elapsed>() {
        AppError::internal("request timed out")
    } else {
        AppError::internal(format!("unhandled middleware error: {error}"))
    }
}
