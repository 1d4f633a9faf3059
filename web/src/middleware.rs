//! Axum middleware for request tracking and access control.
//!
//! - **Correlation ID**: extract or generate a request id, run the request in
//!   a span carrying it, and echo it in the response
//! - **API keys**: reject requests without a configured `X-API-Key`
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware::from_fn_with_state};
//! use stockroom_web::middleware::{correlation_id_layer, require_api_key};
//!
//! let app = Router::new()
//!     .route("/stock/low-stock", get(low_stock))
//!     .route_layer(from_fn_with_state(keys, require_api_key))
//!     .layer(correlation_id_layer());
//! ```

use crate::error::AppError;
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use stockroom_core::BoxFuture;
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Header carrying the client's API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Tag every request with a correlation id.
///
/// A UUID in [`CORRELATION_ID_HEADER`] is reused and anything else is
/// replaced. The id lands in the request extensions and on the
/// `http_request` span, and is echoed in the response.
#[must_use]
pub const fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// See [`correlation_id_layer`].
#[derive(Clone, Debug)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdMiddleware { inner }
    }
}

/// Service produced by [`CorrelationIdLayer`].
#[derive(Clone, Debug)]
pub struct CorrelationIdMiddleware<S> {
    inner: S,
}

fn incoming_correlation_id(req: &Request) -> Option<Uuid> {
    let value = req.headers().get(CORRELATION_ID_HEADER)?.to_str().ok()?;
    Uuid::parse_str(value).ok()
}

impl<S> Service<Request> for CorrelationIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let correlation_id = incoming_correlation_id(&req).unwrap_or_else(Uuid::new_v4);
        req.extensions_mut().insert(correlation_id);

        let span = tracing::info_span!(
            "http_request",
            correlation_id = %correlation_id,
            method = %req.method(),
            uri = %req.uri(),
        );
        let response = self.inner.call(req).instrument(span);

        Box::pin(async move {
            let mut response = response.await?;
            if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
                response.headers_mut().insert(CORRELATION_ID_HEADER, value);
            }
            Ok(response)
        })
    }
}

/// Configured API keys, mapped to the client name each one identifies.
///
/// An empty set disables authentication.
#[derive(Clone, Debug, Default)]
pub struct ApiKeys {
    keys: Arc<HashMap<String, String>>,
}

impl ApiKeys {
    /// Keys from `(key, client)` pairs.
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            keys: Arc::new(keys.into_iter().collect()),
        }
    }

    /// Whether requests must present a key.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Client name for `key`, if configured.
    #[must_use]
    pub fn client(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(String::as_str)
    }

    /// Number of configured keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no key is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Name of the authenticated API client, stored in request extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiClient(pub String);

/// Reject requests without a valid [`API_KEY_HEADER`].
///
/// Passes every request through when no key is configured. On success the
/// client name is stored as an [`ApiClient`] extension.
pub async fn require_api_key(
    State(keys): State<ApiKeys>,
    mut req: Request,
    next: Next,
) -> Response {
    if !keys.is_enabled() {
        return next.run(req).await;
    }

    let client = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|key| keys.client(key))
        .map(str::to_owned);

    match client {
        Some(client) => {
            tracing::debug!(client = %client, "API key accepted");
            req.extensions_mut().insert(ApiClient(client));
            next.run(req).await
        }
        None => {
            tracing::warn!(uri = %req.uri(), "Rejected request without a valid API key");
            AppError::unauthorized("missing or invalid API key").into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use axum::{
        Extension, Router, body::Body, http::Request, middleware::from_fn_with_state, routing::get,
    };
    use tower::ServiceExt;

    fn protected(keys: ApiKeys) -> Router {
        Router::new()
            .route("/test", get(|| async { "ok" }))
            .route_layer(from_fn_with_state(keys, require_api_key))
    }

    #[tokio::test]
    async fn test_correlation_id_generated_if_missing() {
        let app = Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(correlation_id_layer());

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        let correlation_id = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .expect("Correlation ID header should be present");
        assert!(Uuid::parse_str(correlation_id.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_correlation_id_preserved_from_request() {
        let app = Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(correlation_id_layer());

        let request_uuid = Uuid::new_v4();
        let request = Request::builder()
            .uri("/test")
            .header(CORRELATION_ID_HEADER, request_uuid.to_string())
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let response_id = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .expect("Correlation ID header should be present")
            .to_str()
            .unwrap();

        assert_eq!(response_id, request_uuid.to_string());
    }

    #[tokio::test]
    async fn test_malformed_correlation_id_is_replaced() {
        let app = Router::new()
            .route(
                "/test",
                get(|Extension(id): Extension<Uuid>| async move { id.to_string() }),
            )
            .layer(correlation_id_layer());

        let request = Request::builder()
            .uri("/test")
            .header(CORRELATION_ID_HEADER, "not-a-uuid")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        let echoed = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_ne!(echoed, "not-a-uuid");
        assert!(Uuid::parse_str(&echoed).is_ok());
        assert_eq!(&bytes[..], echoed.as_bytes());
    }

    #[tokio::test]
    async fn test_no_keys_means_open_access() {
        let response = protected(ApiKeys::default())
            .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_missing_or_unknown_key_is_401() {
        let keys = ApiKeys::new([("secret".to_string(), "pos".to_string())]);

        let missing = protected(keys.clone())
            .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), 401);

        let wrong = protected(keys.clone())
            .oneshot(
                Request::builder()
                    .uri("/test")
                    .header(API_KEY_HEADER, "guess")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong.status(), 401);

        let accepted = protected(keys)
            .oneshot(
                Request::builder()
                    .uri("/test")
                    .header(API_KEY_HEADER, "secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(accepted.status(), 200);
    }
}
