//! Product catalog.
//!
//! Products are the referential-integrity source for stock rows and
//! reservations. Catalog changes do not emit outbox events.

use crate::error::{InventoryError, Result};
use crate::ids::ProductId;
use crate::BoxFuture;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Product identifier
    pub id: ProductId,
    /// Stock keeping unit, unique across the catalog
    pub sku: String,
    /// Display name
    pub name: String,
    /// Free-form category
    pub category: String,
    /// Unit price, never negative
    pub price: f64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    /// Stock keeping unit
    pub sku: String,
    /// Display name
    pub name: String,
    /// Category
    #[serde(default)]
    pub category: String,
    /// Unit price
    pub price: f64,
}

impl NewProduct {
    /// Check field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Validation`] for a blank sku or name, or a
    /// negative or non-finite price.
    pub fn validate(&self) -> Result<()> {
        if self.sku.trim().is_empty() {
            return Err(InventoryError::validation("sku is required"));
        }
        if self.name.trim().is_empty() {
            return Err(InventoryError::validation("name is required"));
        }
        validate_price(self.price)
    }

    /// Build the stored product at `now`.
    #[must_use]
    pub fn into_product(self, now: DateTime<Utc>) -> Product {
        Product {
            id: ProductId::new(),
            sku: self.sku.trim().to_string(),
            name: self.name,
            category: self.category,
            price: self.price,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a product. The sku is immutable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductUpdate {
    /// New name
    #[serde(default)]
    pub name: Option<String>,
    /// New category
    #[serde(default)]
    pub category: Option<String>,
    /// New price
    #[serde(default)]
    pub price: Option<f64>,
}

impl ProductUpdate {
    /// Check field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Validation`] for a blank name or an invalid price.
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(InventoryError::validation("name cannot be empty"));
            }
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        Ok(())
    }

    /// Apply the update in place.
    pub fn apply(self, product: &mut Product, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            product.name = name;
        }
        if let Some(category) = self.category {
            product.category = category;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        product.updated_at = now;
    }
}

fn validate_price(price: f64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(InventoryError::validation(
            "price must be a non-negative number",
        ));
    }
    Ok(())
}

/// Product catalog storage.
pub trait ProductCatalog: Send + Sync {
    /// Create a product.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Validation`] for invalid fields
    /// - [`InventoryError::Conflict`] if the sku already exists
    fn create_product(&self, product: NewProduct) -> BoxFuture<'_, Result<Product>>;

    /// Fetch a product by id.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::NotFound`] if absent.
    fn get_product(&self, id: ProductId) -> BoxFuture<'_, Result<Product>>;

    /// List products ordered by sku, optionally filtered by category.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Infrastructure`] on storage failure.
    fn list_products(&self, category: Option<String>) -> BoxFuture<'_, Result<Vec<Product>>>;

    /// Update name, category or price.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Validation`] for invalid fields
    /// - [`InventoryError::NotFound`] if absent
    fn update_product(&self, id: ProductId, update: ProductUpdate)
    -> BoxFuture<'_, Result<Product>>;

    /// Delete a product.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::NotFound`] if absent
    /// - [`InventoryError::Conflict`] while stock rows or reservations reference it
    fn delete_product(&self, id: ProductId) -> BoxFuture<'_, Result<()>>;
}
