//! The `events` outbox table.

use crate::PostgresInventory;
use crate::error;
use crate::rows::{EventRow, convert_all, event_columns};
use chrono::{DateTime, Duration, Utc};
use sqlx::PgConnection;
use stockroom_core::{BoxFuture, EventId, EventOutbox, OutboxEvent, Result};

/// Append `event` on the caller's transaction.
pub(crate) async fn append(conn: &mut PgConnection, event: &OutboxEvent) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO events (id, event_type, aggregate_type, aggregate_id, store_id, payload, created_at, synced)
        VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE)
        ",
    )
    .bind(event.id.as_uuid())
    .bind(event.event_type.as_str())
    .bind(event.aggregate_type.as_str())
    .bind(&event.aggregate_id)
    .bind(event.store_id.as_str())
    .bind(sqlx::types::Json(&event.payload))
    .bind(event.created_at)
    .execute(conn)
    .await
    .map_err(error::db("append event"))?;

    tracing::trace!(
        event_id = %event.id,
        event_type = %event.event_type,
        aggregate_id = %event.aggregate_id,
        "Event appended to outbox"
    );
    Ok(())
}

impl PostgresInventory {
    async fn fetch_unsynced_impl(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<EventRow> = sqlx::query_as(concat!(
            "SELECT ",
            event_columns!(),
            " FROM events WHERE synced = FALSE ORDER BY created_at ASC, seq ASC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(error::db("fetch unsynced events"))?;
        convert_all(rows)
    }

    async fn mark_synced_impl(&self, ids: Vec<EventId>, at: DateTime<Utc>) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.begin().await?;
        let mut marked = 0usize;
        for id in &ids {
            let result = sqlx::query(
                "UPDATE events SET synced = TRUE, synced_at = $2 WHERE id = $1 AND synced = FALSE",
            )
            .bind(id.as_uuid())
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(error::db("mark event synced"))?;
            if result.rows_affected() == 1 {
                marked += 1;
            }
        }
        tx.commit().await.map_err(error::db("commit mark synced"))?;
        Ok(marked)
    }

    async fn cleanup_old_events_impl(&self, days_old: u32) -> Result<u64> {
        let cutoff = self.now() - Duration::days(i64::from(days_old));
        let result =
            sqlx::query("DELETE FROM events WHERE synced = TRUE AND synced_at < $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(error::db("cleanup events"))?;
        let deleted = result.rows_affected();
        tracing::info!(deleted, days_old, "Old synced events removed");
        Ok(deleted)
    }

    async fn events_for_aggregate_impl(&self, aggregate_id: String) -> Result<Vec<OutboxEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(concat!(
            "SELECT ",
            event_columns!(),
            " FROM events WHERE aggregate_id = $1 ORDER BY created_at ASC, seq ASC"
        ))
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await
        .map_err(error::db("load aggregate events"))?;
        convert_all(rows)
    }

    async fn count_unsynced_impl(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events WHERE synced = FALSE")
            .fetch_one(&self.pool)
            .await
            .map_err(error::db("count unsynced events"))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

impl EventOutbox for PostgresInventory {
    fn fetch_unsynced(&self, limit: usize) -> BoxFuture<'_, Result<Vec<OutboxEvent>>> {
        Box::pin(self.fetch_unsynced_impl(limit))
    }

    fn mark_synced(&self, ids: Vec<EventId>, at: DateTime<Utc>) -> BoxFuture<'_, Result<usize>> {
        Box::pin(self.mark_synced_impl(ids, at))
    }

    fn cleanup_old_events(&self, days_old: u32) -> BoxFuture<'_, Result<u64>> {
        Box::pin(self.cleanup_old_events_impl(days_old))
    }

    fn events_for_aggregate(
        &self,
        aggregate_id: String,
    ) -> BoxFuture<'_, Result<Vec<OutboxEvent>>> {
        Box::pin(self.events_for_aggregate_impl(aggregate_id))
    }

    fn count_unsynced(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(self.count_unsynced_impl())
    }
}
