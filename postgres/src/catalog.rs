//! The `products` catalog.

use crate::PostgresInventory;
use crate::error;
use crate::rows::{ProductRow, product_columns};
use stockroom_core::{
    BoxFuture, InventoryError, NewProduct, Product, ProductCatalog, ProductId, ProductUpdate,
    Result,
};

impl PostgresInventory {
    async fn create_product_impl(&self, product: NewProduct) -> Result<Product> {
        product.validate()?;
        let product = product.into_product(self.now());
        sqlx::query(
            r"
            INSERT INTO products (id, sku, name, category, price, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ",
        )
        .bind(product.id.as_uuid())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.price)
        .bind(product.created_at)
        .execute(&self.pool)
        .await
        .map_err(error::db("create product"))?;
        tracing::info!(product_id = %product.id, sku = %product.sku, "Product created");
        Ok(product)
    }

    async fn get_product_impl(&self, id: ProductId) -> Result<Product> {
        let row: Option<ProductRow> = sqlx::query_as(concat!(
            "SELECT ",
            product_columns!(),
            " FROM products WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(error::db("load product"))?;
        row.map(Product::from)
            .ok_or_else(|| InventoryError::product_not_found(id))
    }

    async fn list_products_impl(&self, category: Option<String>) -> Result<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(concat!(
            "SELECT ",
            product_columns!(),
            " FROM products WHERE ($1::TEXT IS NULL OR category = $1) ORDER BY sku"
        ))
        .bind(category)
        .fetch_all(&self.pool)
        .await
        .map_err(error::db("list products"))?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn update_product_impl(&self, id: ProductId, update: ProductUpdate) -> Result<Product> {
        update.validate()?;
        let row: Option<ProductRow> = sqlx::query_as(concat!(
            "UPDATE products SET name = COALESCE($2, name), category = COALESCE($3, category), ",
            "price = COALESCE($4, price), updated_at = $5 WHERE id = $1 RETURNING ",
            product_columns!()
        ))
        .bind(id.as_uuid())
        .bind(update.name)
        .bind(update.category)
        .bind(update.price)
        .bind(self.now())
        .fetch_optional(&self.pool)
        .await
        .map_err(error::db("update product"))?;
        row.map(Product::from)
            .ok_or_else(|| InventoryError::product_not_found(id))
    }

    async fn delete_product_impl(&self, id: ProductId) -> Result<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| match error::map_sqlx("delete product", e) {
                // Restricted by a referencing stock or reservation row.
                InventoryError::NotFound { .. } => {
                    InventoryError::conflict(format!("product {id} is still referenced"))
                }
                other => other,
            })?;
        if result.rows_affected() == 0 {
            return Err(InventoryError::product_not_found(id));
        }
        Ok(())
    }
}

impl ProductCatalog for PostgresInventory {
    fn create_product(&self, product: NewProduct) -> BoxFuture<'_, Result<Product>> {
        Box::pin(self.create_product_impl(product))
    }

    fn get_product(&self, id: ProductId) -> BoxFuture<'_, Result<Product>> {
        Box::pin(self.get_product_impl(id))
    }

    fn list_products(&self, category: Option<String>) -> BoxFuture<'_, Result<Vec<Product>>> {
        Box::pin(self.list_products_impl(category))
    }

    fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> BoxFuture<'_, Result<Product>> {
        Box::pin(self.update_product_impl(id, update))
    }

    fn delete_product(&self, id: ProductId) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.delete_product_impl(id))
    }
}
