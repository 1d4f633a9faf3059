//! Axum HTTP surface for the Stockroom inventory core.
//!
//! Handlers are thin: they parse the request, call one capability on
//! [`AppState`] and map the result. Inventory errors become responses
//! through [`AppError`].
//!
//! # Request Flow
//!
//! 1. **Correlation ID** is read or generated and attached to the span
//! 2. **Trace layer** logs the request and its latency
//! 3. **Timeout layer** answers `500` when the deadline passes; the dropped
//!    handler future rolls back any open transaction
//! 4. **API key** is checked on every route except `/health` and `/ready`
//! 5. **Handler** calls the ledger, reservation manager, catalog or outbox
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use stockroom_testing::InMemoryInventory;
//! use stockroom_web::{AppState, router};
//!
//! let state = AppState::from_backend(Arc::new(InMemoryInventory::new()));
//! let app = router(state, Duration::from_secs(15));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    error_handling::HandleErrorLayer,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use handlers::{events, products, reservations, stock};
use std::time::Duration;
use tower::{ServiceBuilder, timeout::TimeoutLayer};
use tower_http::trace::TraceLayer;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{CorrelationId, IdPath, JsonBody, QueryParams, StockKey};
pub use middleware::{
    API_KEY_HEADER, ApiClient, ApiKeys, CORRELATION_ID_HEADER, correlation_id_layer,
    require_api_key,
};
pub use state::{AppState, DEFAULT_RESERVATION_TTL_MINUTES};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Build the complete router.
///
/// `request_timeout` bounds every request, health checks included.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let api = Router::new()
        // Catalog
        .route(
            "/products",
            post(products::create_product).get(products::list_products),
        )
        .route(
            "/products/:id",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        // Ledger
        .route("/stock", post(stock::initialize_stock))
        .route("/stock/transfer", post(stock::transfer_stock))
        .route("/stock/low-stock", get(stock::low_stock))
        .route("/stock/store/:id", get(stock::list_by_store))
        .route("/stock/product/:id", get(stock::list_by_product))
        .route(
            "/stock/:product_id/:store_id",
            get(stock::get_stock).put(stock::update_quantity),
        )
        .route(
            "/stock/:product_id/:store_id/adjust",
            post(stock::adjust_stock),
        )
        .route(
            "/stock/:product_id/:store_id/availability",
            get(stock::check_availability),
        )
        // Reservations
        .route("/reservations", post(reservations::create_reservation))
        .route("/reservations/stats", get(reservations::reservation_stats))
        .route(
            "/customers/:id/reservations",
            get(reservations::list_by_customer),
        )
        .route("/reservations/:id", get(reservations::get_reservation))
        .route(
            "/reservations/:id/confirm",
            post(reservations::confirm_reservation),
        )
        .route(
            "/reservations/:id/cancel",
            post(reservations::cancel_reservation),
        )
        // Outbox
        .route("/events/aggregate/:id", get(events::events_for_aggregate))
        .route("/events/pending-count", get(events::pending_count))
        .route_layer(from_fn_with_state(state.clone(), require_api_key));

    let app = Router::new()
        // Health checks (no authentication)
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .merge(api);

    with_deadline(app, request_timeout)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}

fn with_deadline(app: Router<AppState>, request_timeout: Duration) -> Router<AppState> {
    app.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(error::middleware_error))
            .layer(TimeoutLayer::new(request_timeout)),
    )
}
