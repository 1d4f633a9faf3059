//! Custom Axum extractors.
//!
//! - `CorrelationId`: the request id set by the correlation middleware
//! - `StockKey`: a `/{product_id}/{store_id}` path pair
//! - `IdPath`: a single typed id from the path
//! - `JsonBody` / `QueryParams`: `Json` and `Query` with `400` JSON rejections
//!
//! Paths, bodies and queries are parsed here rather than by the stock axum
//! extractors so that malformed input is answered with the JSON error body
//! every other failure uses.
//!
//! # Examples
//!
//! ```ignore
//! async fn get_stock(
//!     State(state): State<AppState>,
//!     key: StockKey,
//! ) -> Result<Json<Stock>, AppError> {
//!     Ok(Json(state.ledger.get_stock(key.product_id, key.store_id).await?))
//! }
//! ```

use crate::error::AppError;
use axum::{
    Json, async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::str::FromStr;
use stockroom_core::{ProductId, StoreId};
use uuid::Uuid;

use crate::middleware::CORRELATION_ID_HEADER;

/// Correlation ID for request tracing.
///
/// Reads the id stored by the correlation middleware, then the
/// `X-Correlation-ID` header, and generates a new UUID v4 as a last resort.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Uuid>() {
            return Ok(Self(*id));
        }
        let correlation_id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

async fn path_params<S: Send + Sync>(
    parts: &mut Parts,
    state: &S,
) -> Result<HashMap<String, String>, AppError> {
    Path::<HashMap<String, String>>::from_request_parts(parts, state)
        .await
        .map(|Path(params)| params)
        .map_err(|rejection| AppError::validation(rejection.body_text()))
}

fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> Result<&'a str, AppError> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| AppError::internal(format!("route has no :{name} segment")))
}

fn parse<T: FromStr>(raw: &str, what: &str) -> Result<T, AppError> {
    raw.parse()
        .map_err(|_| AppError::validation(format!("invalid {what}: {raw}")))
}

/// `(product_id, store_id)` taken from the `:product_id` and `:store_id`
/// path segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockKey {
    /// Product
    pub product_id: ProductId,
    /// Store
    pub store_id: StoreId,
}

#[async_trait]
impl<S> FromRequestParts<S> for StockKey
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let params = path_params(parts, state).await?;
        let product_id = parse(param(&params, "product_id")?, "product_id")?;
        let store_id = StoreId::new(param(&params, "store_id")?);
        if store_id.is_blank() {
            return Err(AppError::validation("store_id is required"));
        }
        Ok(Self {
            product_id,
            store_id,
        })
    }
}

/// A typed id taken from the `:id` path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for IdPath<T>
where
    S: Send + Sync,
    T: FromStr + Send,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let params = path_params(parts, state).await?;
        parse(param(&params, "id")?, "id").map(Self)
    }
}

/// JSON request body; a malformed body is a `400` validation error.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(body)| Self(body))
            .map_err(|rejection| AppError::validation(rejection.body_text()))
    }
}

/// Query string; malformed parameters are a `400` validation error.
#[derive(Debug, Clone)]
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(params)| Self(params))
            .map_err(|rejection| AppError::validation(rejection.body_text()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_correlation_id_from_header() {
        let uuid = Uuid::new_v4();
        let req = Request::builder()
            .header(CORRELATION_ID_HEADER, uuid.to_string())
            .body(())
            .expect("Valid request");

        let (mut parts, _) = req.into_parts();
        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(correlation_id.0, uuid);
    }

    #[tokio::test]
    async fn test_correlation_id_prefers_extension() {
        let stored = Uuid::new_v4();
        let req = Request::builder()
            .header(CORRELATION_ID_HEADER, Uuid::new_v4().to_string())
            .body(())
            .expect("Valid request");

        let (mut parts, _) = req.into_parts();
        parts.extensions.insert(stored);
        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(correlation_id.0, stored);
    }

    #[tokio::test]
    async fn test_correlation_id_generates_new() {
        let req = Request::builder().body(()).expect("Valid request");

        let (mut parts, _) = req.into_parts();
        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_ne!(correlation_id.0, Uuid::nil());
    }

    #[test]
    fn test_parse_rejects_malformed_ids() {
        let err = parse::<ProductId>("not-a-uuid", "product_id").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(parse::<ProductId>(&ProductId::new().to_string(), "product_id").is_ok());
    }
}
