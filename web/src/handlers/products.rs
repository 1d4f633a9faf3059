//! Product catalog endpoints.
//!
//! - POST /products - Create a product
//! - GET /products?category=c - List products, optionally by category
//! - GET /products/:id - Read a product
//! - PUT /products/:id - Update name, category or price
//! - DELETE /products/:id - Delete an unreferenced product

use crate::error::AppError;
use crate::extractors::{IdPath, JsonBody, QueryParams};
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use stockroom_core::{NewProduct, Product, ProductId, ProductUpdate};

/// Query of the product listing.
#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    /// Only list products in this category
    pub category: Option<String>,
}

/// Create a product. Responds `201 Created`.
pub async fn create_product(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<NewProduct>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let product = state.catalog.create_product(request).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// List products ordered by SKU.
pub async fn list_products(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ListProductsQuery>,
) -> Result<Json<Vec<Product>>, AppError> {
    Ok(Json(state.catalog.list_products(query.category).await?))
}

/// Read one product.
pub async fn get_product(
    State(state): State<AppState>,
    IdPath(id): IdPath<ProductId>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(state.catalog.get_product(id).await?))
}

/// Update a product.
pub async fn update_product(
    State(state): State<AppState>,
    IdPath(id): IdPath<ProductId>,
    JsonBody(update): JsonBody<ProductUpdate>,
) -> Result<Json<Product>, AppError> {
    Ok(Json(state.catalog.update_product(id, update).await?))
}

/// Delete a product. Responds `204 No Content`.
pub async fn delete_product(
    State(state): State<AppState>,
    IdPath(id): IdPath<ProductId>,
) -> Result<StatusCode, AppError> {
    state.catalog.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
