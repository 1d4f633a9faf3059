//! The stock ledger over the `stock` table.
//!
//! Row helpers take a `&mut PgConnection` so the reservation state machine can
//! run them inside its own transaction. They never append events; the public
//! `StockLedger` methods append the `stock.*` event for their own transaction.

use crate::PostgresInventory;
use crate::error;
use crate::outbox;
use crate::rows::{StockRow, stock_columns};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use stockroom_core::ledger::validate_transfer;
use stockroom_core::stock::ensure_positive;
use stockroom_core::{
    BoxFuture, InventoryError, OutboxEvent, ProductId, Result, Stock, StockLedger, StoreId,
    Transfer, TransferMode,
};

/// Lock the `(product, store)` row for the rest of the transaction.
pub(crate) async fn lock_stock(
    conn: &mut PgConnection,
    product_id: ProductId,
    store_id: &StoreId,
) -> Result<Stock> {
    let row: Option<StockRow> = sqlx::query_as(concat!(
        "SELECT ",
        stock_columns!(),
        " FROM stock WHERE product_id = $1 AND store_id = $2 FOR UPDATE"
    ))
    .bind(product_id.as_uuid())
    .bind(store_id.as_str())
    .fetch_optional(conn)
    .await
    .map_err(error::db("lock stock"))?;
    row.map(Stock::from)
        .ok_or_else(|| InventoryError::stock_not_found(product_id, store_id))
}

/// Hold `n` units. Returns the row before and after.
pub(crate) async fn reserve_in_tx(
    conn: &mut PgConnection,
    product_id: ProductId,
    store_id: &StoreId,
    n: i64,
    now: DateTime<Utc>,
) -> Result<(Stock, Stock)> {
    let before = lock_stock(conn, product_id, store_id).await?;
    before.check_reserve(n)?;
    let row: StockRow = sqlx::query_as(concat!(
        "UPDATE stock SET reserved = reserved + $2, version = version + 1, updated_at = $3 WHERE id = $1 RETURNING ",
        stock_columns!()
    ))
    .bind(before.id.as_uuid())
    .bind(n)
    .bind(now)
    .fetch_one(conn)
    .await
    .map_err(error::db("reserve stock"))?;
    Ok((before, row.into()))
}

/// `reserved -= n WHERE reserved >= n`. Zero rows is a conflict.
pub(crate) async fn release_in_tx(
    conn: &mut PgConnection,
    product_id: ProductId,
    store_id: &StoreId,
    n: i64,
    now: DateTime<Utc>,
) -> Result<(Stock, Stock)> {
    let before = lock_stock(conn, product_id, store_id).await?;
    let row: Option<StockRow> = sqlx::query_as(concat!(
        "UPDATE stock SET reserved = reserved - $2, version = version + 1, updated_at = $3 ",
        "WHERE id = $1 AND reserved >= $2 RETURNING ",
        stock_columns!()
    ))
    .bind(before.id.as_uuid())
    .bind(n)
    .bind(now)
    .fetch_optional(conn)
    .await
    .map_err(error::db("release reserved stock"))?;
    match row {
        Some(row) => Ok((before, row.into())),
        None => {
            before.check_release(n)?;
            Err(InventoryError::conflict("release affected no rows"))
        }
    }
}

/// `quantity -= n, reserved -= n WHERE quantity >= n AND reserved >= n`.
/// Zero rows is a conflict.
pub(crate) async fn confirm_in_tx(
    conn: &mut PgConnection,
    product_id: ProductId,
    store_id: &StoreId,
    n: i64,
    now: DateTime<Utc>,
) -> Result<(Stock, Stock)> {
    let before = lock_stock(conn, product_id, store_id).await?;
    let row: Option<StockRow> = sqlx::query_as(concat!(
        "UPDATE stock SET quantity = quantity - $2, reserved = reserved - $2, version = version + 1, updated_at = $3 ",
        "WHERE id = $1 AND quantity >= $2 AND reserved >= $2 RETURNING ",
        stock_columns!()
    ))
    .bind(before.id.as_uuid())
    .bind(n)
    .bind(now)
    .fetch_optional(conn)
    .await
    .map_err(error::db("confirm reserved stock"))?;
    match row {
        Some(row) => Ok((before, row.into())),
        None => {
            before.check_confirm(n)?;
            Err(InventoryError::conflict("confirm affected no rows"))
        }
    }
}

/// Set `quantity` on a row already locked by this transaction.
async fn write_quantity(
    conn: &mut PgConnection,
    locked: &Stock,
    new_quantity: i64,
    now: DateTime<Utc>,
) -> Result<Stock> {
    let row: StockRow = sqlx::query_as(concat!(
        "UPDATE stock SET quantity = $2, version = version + 1, updated_at = $3 WHERE id = $1 RETURNING ",
        stock_columns!()
    ))
    .bind(locked.id.as_uuid())
    .bind(new_quantity)
    .bind(now)
    .fetch_one(conn)
    .await
    .map_err(error::db("write quantity"))?;
    Ok(row.into())
}

pub(crate) async fn ensure_product(conn: &mut PgConnection, product_id: ProductId) -> Result<()> {
    let found: Option<(uuid::Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1")
        .bind(product_id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(error::db("load product"))?;
    found
        .map(|_| ())
        .ok_or_else(|| InventoryError::product_not_found(product_id))
}

impl PostgresInventory {
    #[tracing::instrument(skip_all, fields(product_id = %product_id, store_id = %store_id))]
    async fn initialize_stock_impl(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        initial_quantity: i64,
    ) -> Result<Stock> {
        let now = self.now();
        let stock = Stock::initialize(product_id, store_id, initial_quantity, now)?;

        let mut tx = self.begin().await?;
        ensure_product(&mut tx, product_id).await?;
        let row: StockRow = sqlx::query_as(concat!(
            "INSERT INTO stock (id, product_id, store_id, quantity, reserved, version, created_at, updated_at) ",
            "VALUES ($1, $2, $3, $4, 0, 1, $5, $5) RETURNING ",
            stock_columns!()
        ))
        .bind(stock.id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(stock.store_id.as_str())
        .bind(initial_quantity)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(error::db("initialize stock"))?;
        let stock = Stock::from(row);
        outbox::append(&mut tx, &OutboxEvent::stock_created(&stock, now)).await?;
        tx.commit().await.map_err(error::db("commit initialize stock"))?;

        tracing::info!(quantity = initial_quantity, "Stock initialized");
        Ok(stock)
    }

    async fn get_stock_impl(&self, product_id: ProductId, store_id: StoreId) -> Result<Stock> {
        let row: Option<StockRow> = sqlx::query_as(concat!(
            "SELECT ",
            stock_columns!(),
            " FROM stock WHERE product_id = $1 AND store_id = $2"
        ))
        .bind(product_id.as_uuid())
        .bind(store_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(error::db("load stock"))?;
        row.map(Stock::from)
            .ok_or_else(|| InventoryError::stock_not_found(product_id, &store_id))
    }

    async fn list_stock_by_store_impl(&self, store_id: StoreId) -> Result<Vec<Stock>> {
        let rows: Vec<StockRow> = sqlx::query_as(concat!(
            "SELECT ",
            stock_columns!(),
            " FROM stock WHERE store_id = $1 ORDER BY product_id"
        ))
        .bind(store_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(error::db("list stock by store"))?;
        Ok(rows.into_iter().map(Stock::from).collect())
    }

    async fn list_stock_by_product_impl(&self, product_id: ProductId) -> Result<Vec<Stock>> {
        let rows: Vec<StockRow> = sqlx::query_as(concat!(
            "SELECT ",
            stock_columns!(),
            " FROM stock WHERE product_id = $1 ORDER BY store_id"
        ))
        .bind(product_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(error::db("list stock by product"))?;
        Ok(rows.into_iter().map(Stock::from).collect())
    }

    /// Optimistic: read, check, then compare-and-swap on `version`.
    #[tracing::instrument(skip_all, fields(product_id = %product_id, store_id = %store_id))]
    async fn update_quantity_impl(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        new_quantity: i64,
    ) -> Result<Stock> {
        let before = self.get_stock_impl(product_id, store_id).await?;
        before.check_quantity_update(new_quantity)?;
        let now = self.now();

        let mut tx = self.begin().await?;
        let row: Option<StockRow> = sqlx::query_as(concat!(
            "UPDATE stock SET quantity = $3, version = version + 1, updated_at = $4 ",
            "WHERE id = $1 AND version = $2 AND reserved <= $3 RETURNING ",
            stock_columns!()
        ))
        .bind(before.id.as_uuid())
        .bind(before.version)
        .bind(new_quantity)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(error::db("update quantity"))?;
        let Some(row) = row else {
            return Err(InventoryError::conflict(format!(
                "stock {product_id}/{} changed since version {}",
                before.store_id, before.version
            )));
        };
        let after = Stock::from(row);
        outbox::append(&mut tx, &OutboxEvent::stock_updated(&before, &after, now)).await?;
        tx.commit().await.map_err(error::db("commit update quantity"))?;
        Ok(after)
    }

    #[tracing::instrument(skip_all, fields(product_id = %product_id, store_id = %store_id))]
    async fn adjust_stock_impl(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        delta: i64,
    ) -> Result<Stock> {
        if delta == 0 {
            return Err(InventoryError::validation("adjustment must be non-zero"));
        }
        let now = self.now();
        let mut tx = self.begin().await?;
        let before = lock_stock(&mut tx, product_id, &store_id).await?;
        let new_quantity = before.adjusted_quantity(delta)?;
        let after = write_quantity(&mut tx, &before, new_quantity, now).await?;
        outbox::append(&mut tx, &OutboxEvent::stock_updated(&before, &after, now)).await?;
        tx.commit().await.map_err(error::db("commit adjust stock"))?;
        Ok(after)
    }

    #[tracing::instrument(skip_all, fields(product_id = %product_id, store_id = %store_id))]
    async fn reserve_stock_impl(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        n: i64,
    ) -> Result<Stock> {
        ensure_positive(n, "quantity")?;
        let now = self.now();
        let mut tx = self.begin().await?;
        let (before, after) = reserve_in_tx(&mut tx, product_id, &store_id, n, now).await?;
        outbox::append(&mut tx, &OutboxEvent::stock_updated(&before, &after, now)).await?;
        tx.commit().await.map_err(error::db("commit reserve stock"))?;
        Ok(after)
    }

    #[tracing::instrument(skip_all, fields(product_id = %product_id, store_id = %store_id))]
    async fn release_reserved_stock_impl(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        n: i64,
    ) -> Result<Stock> {
        ensure_positive(n, "quantity")?;
        let now = self.now();
        let mut tx = self.begin().await?;
        let (before, after) = release_in_tx(&mut tx, product_id, &store_id, n, now).await?;
        outbox::append(&mut tx, &OutboxEvent::stock_updated(&before, &after, now)).await?;
        tx.commit().await.map_err(error::db("commit release stock"))?;
        Ok(after)
    }

    #[tracing::instrument(skip_all, fields(product_id = %product_id, store_id = %store_id))]
    async fn confirm_reserved_stock_impl(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        n: i64,
    ) -> Result<Stock> {
        ensure_positive(n, "quantity")?;
        let now = self.now();
        let mut tx = self.begin().await?;
        let (before, after) = confirm_in_tx(&mut tx, product_id, &store_id, n, now).await?;
        outbox::append(&mut tx, &OutboxEvent::stock_updated(&before, &after, now)).await?;
        tx.commit().await.map_err(error::db("commit confirm stock"))?;
        Ok(after)
    }

    #[tracing::instrument(skip_all, fields(product_id = %product_id, from = %from, to = %to, mode = %self.transfer_mode))]
    async fn transfer_stock_impl(
        &self,
        product_id: ProductId,
        from: StoreId,
        to: StoreId,
        n: i64,
    ) -> Result<Transfer> {
        validate_transfer(&from, &to, n)?;

        // Destination must exist; transfers never create rows.
        let source = self.get_stock_impl(product_id, from.clone()).await?;
        let destination = self.get_stock_impl(product_id, to.clone()).await?;
        source.check_transfer_out(n)?;
        destination.credited_quantity(n)?;

        match self.transfer_mode {
            TransferMode::Atomic => self.transfer_atomic(product_id, &from, &to, n).await,
            TransferMode::Compensating => {
                self.transfer_compensating(product_id, &from, &to, n).await
            }
        }
    }

    /// One transaction, both rows locked in store order.
    async fn transfer_atomic(
        &self,
        product_id: ProductId,
        from: &StoreId,
        to: &StoreId,
        n: i64,
    ) -> Result<Transfer> {
        let now = self.now();
        let mut tx = self.begin().await?;

        let (first, second) = if from < to { (from, to) } else { (to, from) };
        let first_row = lock_stock(&mut tx, product_id, first).await?;
        let second_row = lock_stock(&mut tx, product_id, second).await?;
        let (source, destination) = if first == from {
            (first_row, second_row)
        } else {
            (second_row, first_row)
        };

        source.check_transfer_out(n)?;
        let credited = destination.credited_quantity(n)?;
        let source = write_quantity(&mut tx, &source, source.quantity - n, now).await?;
        let destination = write_quantity(&mut tx, &destination, credited, now).await?;
        outbox::append(&mut tx, &OutboxEvent::stock_transferred(&source, to, n, now)).await?;
        tx.commit().await.map_err(error::db("commit transfer"))?;

        tracing::info!(quantity = n, "Stock transferred");
        Ok(Transfer {
            source,
            destination,
        })
    }

    /// Source and destination in separate transactions with a best-effort
    /// compensating increment if the destination step fails.
    async fn transfer_compensating(
        &self,
        product_id: ProductId,
        from: &StoreId,
        to: &StoreId,
        n: i64,
    ) -> Result<Transfer> {
        let now = self.now();
        let source = {
            let mut tx = self.begin().await?;
            let locked = lock_stock(&mut tx, product_id, from).await?;
            locked.check_transfer_out(n)?;
            let source = write_quantity(&mut tx, &locked, locked.quantity - n, now).await?;
            outbox::append(&mut tx, &OutboxEvent::stock_transferred(&source, to, n, now))
                .await?;
            tx.commit().await.map_err(error::db("commit transfer source"))?;
            source
        };

        match self.credit_destination(product_id, to, n).await {
            Ok(destination) => {
                tracing::info!(quantity = n, "Stock transferred");
                Ok(Transfer {
                    source,
                    destination,
                })
            }
            Err(destination_error) => {
                tracing::warn!(error = %destination_error, "Transfer destination failed, compensating source");
                match self.compensate_source(product_id, from, n).await {
                    Ok(_) => Err(destination_error),
                    Err(compensation_error) => {
                        tracing::error!(
                            quantity = n,
                            destination_error = %destination_error,
                            compensation_error = %compensation_error,
                            "Transfer compensation failed; units lost from ledger"
                        );
                        Err(InventoryError::infrastructure(format!(
                            "transfer of {n} units from {from} to {to} failed and could not be compensated: {compensation_error}"
                        )))
                    }
                }
            }
        }
    }

    async fn credit_destination(
        &self,
        product_id: ProductId,
        to: &StoreId,
        n: i64,
    ) -> Result<Stock> {
        let now = self.now();
        let mut tx = self.begin().await?;
        let locked = lock_stock(&mut tx, product_id, to).await?;
        let credited = locked.credited_quantity(n)?;
        let destination = write_quantity(&mut tx, &locked, credited, now).await?;
        tx.commit()
            .await
            .map_err(error::db("commit transfer destination"))?;
        Ok(destination)
    }

    async fn compensate_source(
        &self,
        product_id: ProductId,
        from: &StoreId,
        n: i64,
    ) -> Result<Stock> {
        let now = self.now();
        let mut tx = self.begin().await?;
        let before = lock_stock(&mut tx, product_id, from).await?;
        let credited = before
            .quantity
            .checked_add(n)
            .ok_or_else(|| InventoryError::validation("compensation overflows source quantity"))?;
        let after = write_quantity(&mut tx, &before, credited, now).await?;
        outbox::append(&mut tx, &OutboxEvent::stock_updated(&before, &after, now)).await?;
        tx.commit()
            .await
            .map_err(error::db("commit transfer compensation"))?;
        Ok(after)
    }

    async fn check_availability_impl(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        n: i64,
    ) -> Result<bool> {
        ensure_positive(n, "quantity")?;
        let stock = self.get_stock_impl(product_id, store_id).await?;
        Ok(stock.available() >= n)
    }

    async fn low_stock_items_impl(&self, threshold: i64) -> Result<Vec<Stock>> {
        if threshold < 0 {
            return Err(InventoryError::validation("threshold must be non-negative"));
        }
        let rows: Vec<StockRow> = sqlx::query_as(concat!(
            "SELECT ",
            stock_columns!(),
            " FROM stock WHERE (quantity - reserved) <= $1 ",
            "ORDER BY (quantity - reserved) ASC, product_id, store_id"
        ))
        .bind(threshold)
        .fetch_all(&self.pool)
        .await
        .map_err(error::db("low stock scan"))?;
        Ok(rows.into_iter().map(Stock::from).collect())
    }
}

impl StockLedger for PostgresInventory {
    fn initialize_stock(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        initial_quantity: i64,
    ) -> BoxFuture<'_, Result<Stock>> {
        Box::pin(self.initialize_stock_impl(product_id, store_id, initial_quantity))
    }

    fn get_stock(&self, product_id: ProductId, store_id: StoreId) -> BoxFuture<'_, Result<Stock>> {
        Box::pin(self.get_stock_impl(product_id, store_id))
    }

    fn list_stock_by_store(&self, store_id: StoreId) -> BoxFuture<'_, Result<Vec<Stock>>> {
        Box::pin(self.list_stock_by_store_impl(store_id))
    }

    fn list_stock_by_product(&self, product_id: ProductId) -> BoxFuture<'_, Result<Vec<Stock>>> {
        Box::pin(self.list_stock_by_product_impl(product_id))
    }

    fn update_quantity(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        new_quantity: i64,
    ) -> BoxFuture<'_, Result<Stock>> {
        Box::pin(self.update_quantity_impl(product_id, store_id, new_quantity))
    }

    fn adjust_stock(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        delta: i64,
    ) -> BoxFuture<'_, Result<Stock>> {
        Box::pin(self.adjust_stock_impl(product_id, store_id, delta))
    }

    fn reserve_stock(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        n: i64,
    ) -> BoxFuture<'_, Result<Stock>> {
        Box::pin(self.reserve_stock_impl(product_id, store_id, n))
    }

    fn release_reserved_stock(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        n: i64,
    ) -> BoxFuture<'_, Result<Stock>> {
        Box::pin(self.release_reserved_stock_impl(product_id, store_id, n))
    }

    fn confirm_reserved_stock(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        n: i64,
    ) -> BoxFuture<'_, Result<Stock>> {
        Box::pin(self.confirm_reserved_stock_impl(product_id, store_id, n))
    }

    fn transfer_stock(
        &self,
        product_id: ProductId,
        from_store_id: StoreId,
        to_store_id: StoreId,
        n: i64,
    ) -> BoxFuture<'_, Result<Transfer>> {
        Box::pin(self.transfer_stock_impl(product_id, from_store_id, to_store_id, n))
    }

    fn check_availability(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        n: i64,
    ) -> BoxFuture<'_, Result<bool>> {
        Box::pin(self.check_availability_impl(product_id, store_id, n))
    }

    fn low_stock_items(&self, threshold: i64) -> BoxFuture<'_, Result<Vec<Stock>>> {
        Box::pin(self.low_stock_items_impl(threshold))
    }
}
