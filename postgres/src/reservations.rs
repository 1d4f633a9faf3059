//! The reservation state machine over the `reservations` table.
//!
//! Each transition locks the reservation row, then runs the paired ledger
//! operation on the stock row, updates the status and appends the
//! `reservation.*` event, all in one transaction. Nothing is compensated
//! across transactions: a failure anywhere rolls the whole step back.

use crate::PostgresInventory;
use crate::error;
use crate::ledger::{confirm_in_tx, ensure_product, release_in_tx, reserve_in_tx};
use crate::outbox;
use crate::rows::{ReservationRow, convert_all, reservation_columns};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use stockroom_core::{
    BoxFuture, CustomerId, EventType, ExpireOutcome, InventoryError, NewReservation, OutboxEvent,
    Reservation, ReservationId, ReservationManager, ReservationStats, ReservationStatus, Result,
};

async fn lock_reservation(conn: &mut PgConnection, id: ReservationId) -> Result<Reservation> {
    let row: Option<ReservationRow> = sqlx::query_as(concat!(
        "SELECT ",
        reservation_columns!(),
        " FROM reservations WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(conn)
    .await
    .map_err(error::db("lock reservation"))?;
    row.map(Reservation::try_from)
        .transpose()?
        .ok_or_else(|| InventoryError::reservation_not_found(id))
}

/// Move a locked `PENDING` row to `to`.
async fn write_status(
    conn: &mut PgConnection,
    reservation: &mut Reservation,
    to: ReservationStatus,
    now: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE reservations SET status = $2, updated_at = $3 WHERE id = $1 AND status = 'PENDING'",
    )
    .bind(reservation.id.as_uuid())
    .bind(to.as_str())
    .bind(now)
    .execute(conn)
    .await
    .map_err(error::db("update reservation status"))?;
    if result.rows_affected() == 0 {
        return Err(InventoryError::conflict(format!(
            "reservation {} left PENDING concurrently",
            reservation.id
        )));
    }
    reservation.transition(to, now)
}

fn record_transition(status: ReservationStatus) {
    metrics::counter!("stockroom_reservations_total", "status" => status.as_str()).increment(1);
}

impl PostgresInventory {
    #[tracing::instrument(skip_all, fields(product_id = %request.product_id, store_id = %request.store_id, quantity = request.quantity))]
    async fn create_reservation_impl(&self, request: NewReservation) -> Result<Reservation> {
        request.validate()?;
        let now = self.now();
        let reservation = request.into_reservation(now)?;

        let mut tx = self.begin().await?;
        ensure_product(&mut tx, reservation.product_id).await?;
        reserve_in_tx(
            &mut tx,
            reservation.product_id,
            &reservation.store_id,
            reservation.quantity,
            now,
        )
        .await?;

        sqlx::query(
            r"
            INSERT INTO reservations (id, product_id, store_id, customer_id, quantity, status, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            ",
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.product_id.as_uuid())
        .bind(reservation.store_id.as_str())
        .bind(reservation.customer_id.as_str())
        .bind(reservation.quantity)
        .bind(reservation.status.as_str())
        .bind(reservation.expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(error::db("insert reservation"))?;

        outbox::append(
            &mut tx,
            &OutboxEvent::for_reservation(EventType::ReservationCreated, &reservation, now),
        )
        .await?;
        tx.commit().await.map_err(error::db("commit create reservation"))?;

        record_transition(ReservationStatus::Pending);
        tracing::info!(reservation_id = %reservation.id, expires_at = %reservation.expires_at, "Reservation created");
        Ok(reservation)
    }

    async fn get_reservation_impl(&self, id: ReservationId) -> Result<Reservation> {
        let row: Option<ReservationRow> = sqlx::query_as(concat!(
            "SELECT ",
            reservation_columns!(),
            " FROM reservations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(error::db("load reservation"))?;
        row.map(Reservation::try_from)
            .transpose()?
            .ok_or_else(|| InventoryError::reservation_not_found(id))
    }

    async fn list_by_customer_impl(&self, customer_id: CustomerId) -> Result<Vec<Reservation>> {
        let rows: Vec<ReservationRow> = sqlx::query_as(concat!(
            "SELECT ",
            reservation_columns!(),
            " FROM reservations WHERE customer_id = $1 ORDER BY created_at DESC"
        ))
        .bind(customer_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(error::db("list reservations by customer"))?;
        convert_all(rows)
    }

    #[tracing::instrument(skip_all, fields(reservation_id = %id))]
    async fn confirm_reservation_impl(&self, id: ReservationId) -> Result<Reservation> {
        let now = self.now();
        let mut tx = self.begin().await?;
        let mut reservation = lock_reservation(&mut tx, id).await?;
        // An expired PENDING row is left for the expiration worker.
        reservation.ensure_confirmable(now)?;

        confirm_in_tx(
            &mut tx,
            reservation.product_id,
            &reservation.store_id,
            reservation.quantity,
            now,
        )
        .await?;
        write_status(&mut tx, &mut reservation, ReservationStatus::Confirmed, now).await?;
        outbox::append(
            &mut tx,
            &OutboxEvent::for_reservation(EventType::ReservationConfirmed, &reservation, now),
        )
        .await?;
        tx.commit()
            .await
            .map_err(error::db("commit confirm reservation"))?;

        record_transition(ReservationStatus::Confirmed);
        tracing::info!("Reservation confirmed");
        Ok(reservation)
    }

    #[tracing::instrument(skip_all, fields(reservation_id = %id))]
    async fn cancel_reservation_impl(&self, id: ReservationId) -> Result<Reservation> {
        let now = self.now();
        let mut tx = self.begin().await?;
        let mut reservation = lock_reservation(&mut tx, id).await?;
        reservation.ensure_pending()?;

        release_in_tx(
            &mut tx,
            reservation.product_id,
            &reservation.store_id,
            reservation.quantity,
            now,
        )
        .await?;
        write_status(&mut tx, &mut reservation, ReservationStatus::Cancelled, now).await?;
        outbox::append(
            &mut tx,
            &OutboxEvent::for_reservation(EventType::ReservationCancelled, &reservation, now),
        )
        .await?;
        tx.commit()
            .await
            .map_err(error::db("commit cancel reservation"))?;

        record_transition(ReservationStatus::Cancelled);
        tracing::info!("Reservation cancelled");
        Ok(reservation)
    }

    #[tracing::instrument(skip_all, fields(reservation_id = %id))]
    async fn expire_reservation_impl(&self, id: ReservationId) -> Result<ExpireOutcome> {
        let now = self.now();
        let mut tx = self.begin().await?;
        let mut reservation = lock_reservation(&mut tx, id).await?;
        if reservation.status.is_terminal() {
            return Ok(ExpireOutcome::AlreadyTerminal);
        }
        if !reservation.is_expired_at(now) {
            return Ok(ExpireOutcome::NotDue);
        }

        release_in_tx(
            &mut tx,
            reservation.product_id,
            &reservation.store_id,
            reservation.quantity,
            now,
        )
        .await?;
        write_status(&mut tx, &mut reservation, ReservationStatus::Expired, now).await?;
        outbox::append(
            &mut tx,
            &OutboxEvent::for_reservation(EventType::ReservationExpired, &reservation, now),
        )
        .await?;
        tx.commit()
            .await
            .map_err(error::db("commit expire reservation"))?;

        record_transition(ReservationStatus::Expired);
        tracing::info!("Reservation expired");
        Ok(ExpireOutcome::Expired)
    }

    async fn process_expired_impl(&self) -> Result<usize> {
        let now = self.now();
        let candidates: Vec<(uuid::Uuid,)> = sqlx::query_as(
            "SELECT id FROM reservations WHERE status = 'PENDING' AND expires_at < $1 ORDER BY expires_at ASC",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(error::db("scan expired reservations"))?;

        let mut expired = 0usize;
        for (id,) in candidates {
            let id = ReservationId::from_uuid(id);
            match self.expire_reservation_impl(id).await {
                Ok(ExpireOutcome::Expired) => expired += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(reservation_id = %id, error = %e, "Failed to expire reservation");
                }
            }
        }
        Ok(expired)
    }

    async fn reservation_stats_impl(&self) -> Result<ReservationStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM reservations GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(error::db("reservation stats"))?;
        let mut stats = ReservationStats::default();
        for (status, count) in rows {
            let status: ReservationStatus = status.parse().map_err(|_| {
                InventoryError::infrastructure(format!("Invalid reservation status: {status}"))
            })?;
            stats.add(status, u64::try_from(count).unwrap_or(0));
        }
        Ok(stats)
    }

    async fn purge_terminal_impl(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM reservations WHERE status <> 'PENDING' AND updated_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(error::db("purge reservations"))?;
        let purged = result.rows_affected();
        tracing::info!(purged, older_than = %older_than, "Terminal reservations purged");
        Ok(purged)
    }
}

impl ReservationManager for PostgresInventory {
    fn create_reservation(&self, request: NewReservation) -> BoxFuture<'_, Result<Reservation>> {
        Box::pin(self.create_reservation_impl(request))
    }

    fn get_reservation(&self, id: ReservationId) -> BoxFuture<'_, Result<Reservation>> {
        Box::pin(self.get_reservation_impl(id))
    }

    fn list_reservations_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> BoxFuture<'_, Result<Vec<Reservation>>> {
        Box::pin(self.list_by_customer_impl(customer_id))
    }

    fn confirm_reservation(&self, id: ReservationId) -> BoxFuture<'_, Result<Reservation>> {
        Box::pin(self.confirm_reservation_impl(id))
    }

    fn cancel_reservation(&self, id: ReservationId) -> BoxFuture<'_, Result<Reservation>> {
        Box::pin(self.cancel_reservation_impl(id))
    }

    fn expire_reservation(&self, id: ReservationId) -> BoxFuture<'_, Result<ExpireOutcome>> {
        Box::pin(self.expire_reservation_impl(id))
    }

    fn process_expired_reservations(&self) -> BoxFuture<'_, Result<usize>> {
        Box::pin(self.process_expired_impl())
    }

    fn reservation_stats(&self) -> BoxFuture<'_, Result<ReservationStats>> {
        Box::pin(self.reservation_stats_impl())
    }

    fn purge_terminal_reservations(
        &self,
        older_than: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<u64>> {
        Box::pin(self.purge_terminal_impl(older_than))
    }
}
