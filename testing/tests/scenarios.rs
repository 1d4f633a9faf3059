//! End-to-end inventory scenarios against the in-memory backend.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use chrono::Duration;
use futures::future::join_all;
use std::sync::Arc;
use stockroom_core::outbox::StockTransferredPayload;
use stockroom_core::{
    EventOutbox, EventType, InventoryError, ProductCatalog, ProductId, ReservationManager,
    ReservationStatus, StockLedger, StoreId,
};
use stockroom_testing::fixtures::{hold, new_product};
use stockroom_testing::{InMemoryInventory, ManualClock};

async fn stocked(quantity: i64) -> (InMemoryInventory, ManualClock, ProductId, StoreId) {
    let clock = ManualClock::default();
    let inventory = InMemoryInventory::with_clock(Arc::new(clock.clone()));
    let product = inventory
        .create_product(new_product("SKU-1"))
        .await
        .unwrap();
    let store = StoreId::new("s1");
    inventory
        .initialize_stock(product.id, store.clone(), quantity)
        .await
        .unwrap();
    (inventory, clock, product.id, store)
}

fn event_types(inventory: &InMemoryInventory) -> Vec<EventType> {
    inventory
        .events()
        .unwrap()
        .iter()
        .map(|e| e.event_type)
        .collect()
}

#[tokio::test]
async fn reserve_then_confirm_ships_units() {
    let (inv, _, product, store) = stocked(100).await;

    let reservation = inv
        .create_reservation(hold(product, &store, "c-1", 10, 15))
        .await
        .unwrap();
    let stock = inv.get_stock(product, store.clone()).await.unwrap();
    assert_eq!((stock.quantity, stock.reserved, stock.available()), (100, 10, 90));

    let confirmed = inv.confirm_reservation(reservation.id).await.unwrap();
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);

    let stock = inv.get_stock(product, store).await.unwrap();
    assert_eq!((stock.quantity, stock.reserved), (90, 0));
    assert_eq!(
        event_types(&inv),
        [
            EventType::StockCreated,
            EventType::ReservationCreated,
            EventType::ReservationConfirmed
        ]
    );
}

#[tokio::test]
async fn concurrent_holds_never_oversell() {
    let (inv, _, product, store) = stocked(10).await;

    let attempts = (0..20).map(|i| {
        let inv = inv.clone();
        let request = hold(product, &store, &format!("c-{i}"), 1, 15);
        tokio::spawn(async move { inv.create_reservation(request).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(InventoryError::InsufficientStock { .. })))
        .count();
    assert_eq!((succeeded, refused), (10, 10));

    let stock = inv.get_stock(product, store).await.unwrap();
    assert_eq!((stock.quantity, stock.reserved, stock.available()), (10, 10, 0));
    assert!(inv.invariant_violation().unwrap().is_none());
}

#[tokio::test]
async fn holds_succeed_up_to_whole_multiples() {
    let (inv, _, product, store) = stocked(25).await;

    let attempts = (0..8).map(|i| {
        let inv = inv.clone();
        let request = hold(product, &store, &format!("c-{i}"), 4, 15);
        tokio::spawn(async move { inv.create_reservation(request).await })
    });
    let succeeded = join_all(attempts)
        .await
        .into_iter()
        .filter(|joined| matches!(joined, Ok(Ok(_))))
        .count();

    assert_eq!(succeeded, 6);
    let stock = inv.get_stock(product, store).await.unwrap();
    assert_eq!((stock.reserved, stock.available()), (24, 1));
}

#[tokio::test]
async fn overdue_reservation_is_reaped() {
    let (inv, clock, product, store) = stocked(50).await;
    let reservation = inv
        .create_reservation(hold(product, &store, "c-1", 5, 1))
        .await
        .unwrap();
    clock.advance(Duration::minutes(2));

    assert_eq!(inv.process_expired_reservations().await.unwrap(), 1);

    let reaped = inv.get_reservation(reservation.id).await.unwrap();
    assert_eq!(reaped.status, ReservationStatus::Expired);
    let stock = inv.get_stock(product, store).await.unwrap();
    assert_eq!((stock.quantity, stock.reserved), (50, 0));
    assert!(event_types(&inv).contains(&EventType::ReservationExpired));
}

#[tokio::test]
async fn concurrent_sweeps_expire_each_row_once() {
    let (inv, clock, product, store) = stocked(50).await;
    for i in 0..5 {
        inv.create_reservation(hold(product, &store, &format!("c-{i}"), 2, 1))
            .await
            .unwrap();
    }
    clock.advance(Duration::minutes(5));

    let sweeps = (0..4).map(|_| {
        let inv = inv.clone();
        tokio::spawn(async move { inv.process_expired_reservations().await })
    });
    let expired: usize = join_all(sweeps)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .sum();

    assert_eq!(expired, 5);
    let stats = inv.reservation_stats().await.unwrap();
    assert_eq!((stats.expired, stats.pending), (5, 0));
    let expired_events = event_types(&inv)
        .into_iter()
        .filter(|t| *t == EventType::ReservationExpired)
        .count();
    assert_eq!(expired_events, 5);
    assert!(inv.invariant_violation().unwrap().is_none());
}

#[tokio::test]
async fn transfer_moves_units_between_stores() {
    let (inv, _, product, a) = stocked(100).await;
    let b = StoreId::new("s2");
    inv.initialize_stock(product, b.clone(), 50).await.unwrap();

    let transfer = inv
        .transfer_stock(product, a.clone(), b.clone(), 20)
        .await
        .unwrap();
    assert_eq!(transfer.source.quantity, 80);
    assert_eq!(transfer.destination.quantity, 70);

    let events = inv
        .events_for_aggregate(transfer.source.id.to_string())
        .await
        .unwrap();
    let moved = events
        .iter()
        .find(|e| e.event_type == EventType::StockTransferred)
        .expect("transfer event");
    let payload: StockTransferredPayload = moved.payload_as().unwrap();
    assert_eq!(payload.from_store_id, a);
    assert_eq!(payload.to_store_id, b);
    assert_eq!(payload.quantity, 20);

    let total: i64 = inv
        .list_stock_by_product(product)
        .await
        .unwrap()
        .iter()
        .map(|s| s.quantity)
        .sum();
    assert_eq!(total, 150);
}

#[tokio::test]
async fn transfer_refuses_units_held_by_reservations() {
    let (inv, _, product, a) = stocked(10).await;
    let b = StoreId::new("s2");
    inv.initialize_stock(product, b.clone(), 0).await.unwrap();
    inv.create_reservation(hold(product, &a, "c-1", 8, 15))
        .await
        .unwrap();

    let err = inv.transfer_stock(product, a.clone(), b, 5).await.unwrap_err();
    assert!(matches!(err, InventoryError::Conflict(_)));
    assert_eq!(inv.get_stock(product, a).await.unwrap().quantity, 10);
}

#[tokio::test]
async fn transfer_into_a_full_row_is_rejected_before_debit() {
    let (inv, _, product, a) = stocked(10).await;
    let b = StoreId::new("s2");
    inv.initialize_stock(product, b.clone(), i64::MAX - 5)
        .await
        .unwrap();

    let err = inv
        .transfer_stock(product, a.clone(), b.clone(), 10)
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::Validation(_)));
    assert_eq!(inv.get_stock(product, a).await.unwrap().quantity, 10);
    assert_eq!(inv.get_stock(product, b).await.unwrap().quantity, i64::MAX - 5);
}

#[tokio::test]
async fn oversized_ttl_is_rejected_and_the_store_keeps_serving() {
    let (inv, _, product, store) = stocked(10).await;
    let mut request = hold(product, &store, "c-1", 2, 15);
    request.ttl = Duration::try_minutes(1_000_000_000_000).unwrap();

    let task = {
        let inv = inv.clone();
        tokio::spawn(async move { inv.create_reservation(request).await })
    };
    let result = task.await.expect("create_reservation must not panic");
    assert!(matches!(result, Err(InventoryError::Validation(_))));

    let stock = inv.get_stock(product, store.clone()).await.unwrap();
    assert_eq!((stock.quantity, stock.reserved), (10, 0));
    inv.create_reservation(hold(product, &store, "c-2", 2, 15))
        .await
        .unwrap();
    assert_eq!(
        event_types(&inv),
        [EventType::StockCreated, EventType::ReservationCreated]
    );
}

#[tokio::test]
async fn cancel_is_not_expire() {
    let (inv, _, product, store) = stocked(30).await;
    let reservation = inv
        .create_reservation(hold(product, &store, "c-1", 7, 15))
        .await
        .unwrap();

    let cancelled = inv.cancel_reservation(reservation.id).await.unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(inv.get_stock(product, store).await.unwrap().reserved, 0);
    assert_eq!(
        event_types(&inv).last(),
        Some(&EventType::ReservationCancelled)
    );

    // Terminal rows stay terminal.
    assert!(matches!(
        inv.confirm_reservation(reservation.id).await,
        Err(InventoryError::InvalidState {
            status: ReservationStatus::Cancelled,
            ..
        })
    ));
}

#[tokio::test]
async fn late_confirm_is_refused_and_left_for_the_sweep() {
    let (inv, clock, product, store) = stocked(10).await;
    let reservation = inv
        .create_reservation(hold(product, &store, "c-1", 3, 15))
        .await
        .unwrap();
    clock.advance(Duration::minutes(20));

    let err = inv.confirm_reservation(reservation.id).await.unwrap_err();
    assert_eq!(err, InventoryError::ReservationExpired(reservation.id));
    assert_eq!(
        inv.get_reservation(reservation.id).await.unwrap().status,
        ReservationStatus::Pending
    );

    assert_eq!(inv.process_expired_reservations().await.unwrap(), 1);
    assert_eq!(inv.get_stock(product, store).await.unwrap().reserved, 0);
}

#[tokio::test]
async fn update_quantity_cannot_drop_below_reserved() {
    let (inv, _, product, store) = stocked(10).await;
    inv.create_reservation(hold(product, &store, "c-1", 6, 15))
        .await
        .unwrap();

    let err = inv
        .update_quantity(product, store.clone(), 5)
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::Validation(_)));

    let stock = inv.update_quantity(product, store, 6).await.unwrap();
    assert_eq!(stock.available(), 0);
}

#[tokio::test]
async fn low_stock_lists_rows_at_or_under_threshold() {
    let (inv, _, product, s1) = stocked(3).await;
    let s2 = StoreId::new("s2");
    inv.initialize_stock(product, s2, 40).await.unwrap();
    inv.create_reservation(hold(product, &s1, "c-1", 1, 15))
        .await
        .unwrap();

    let low = inv.low_stock_items(5).await.unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].store_id, s1);
    assert!(matches!(
        inv.low_stock_items(-1).await,
        Err(InventoryError::Validation(_))
    ));
}

#[tokio::test]
async fn every_mutation_lands_in_the_outbox() {
    let (inv, _, product, store) = stocked(10).await;
    inv.adjust_stock(product, store.clone(), 5).await.unwrap();
    inv.reserve_stock(product, store.clone(), 2).await.unwrap();
    inv.release_reserved_stock(product, store.clone(), 2)
        .await
        .unwrap();
    inv.update_quantity(product, store.clone(), 12).await.unwrap();

    let stock = inv.get_stock(product, store).await.unwrap();
    let events = inv
        .events_for_aggregate(stock.id.to_string())
        .await
        .unwrap();
    assert_eq!(events.len(), 5);
    assert_eq!(stock.version, 5);
    assert_eq!(inv.count_unsynced().await.unwrap(), 5);
}

#[tokio::test]
async fn customer_listing_is_newest_first() {
    let (inv, clock, product, store) = stocked(10).await;
    let first = inv
        .create_reservation(hold(product, &store, "c-1", 1, 15))
        .await
        .unwrap();
    clock.advance(Duration::seconds(1));
    let second = inv
        .create_reservation(hold(product, &store, "c-1", 1, 15))
        .await
        .unwrap();
    inv.create_reservation(hold(product, &store, "c-2", 1, 15))
        .await
        .unwrap();

    let listed = inv
        .list_reservations_by_customer("c-1".into())
        .await
        .unwrap();
    let ids: Vec<_> = listed.iter().map(|r| r.id).collect();
    assert_eq!(ids, [second.id, first.id]);
}

#[tokio::test]
async fn purge_drops_only_old_terminal_reservations() {
    let (inv, clock, product, store) = stocked(10).await;
    let done = inv
        .create_reservation(hold(product, &store, "c-1", 1, 15))
        .await
        .unwrap();
    inv.cancel_reservation(done.id).await.unwrap();
    let open = inv
        .create_reservation(hold(product, &store, "c-1", 1, 60 * 24 * 90))
        .await
        .unwrap();

    clock.advance(Duration::days(31));
    let purged = inv
        .purge_terminal_reservations(clock_now(&clock) - Duration::days(30))
        .await
        .unwrap();
    assert_eq!(purged, 1);
    assert!(inv.get_reservation(done.id).await.is_err());
    assert!(inv.get_reservation(open.id).await.is_ok());
}

fn clock_now(clock: &ManualClock) -> chrono::DateTime<chrono::Utc> {
    use stockroom_core::Clock;
    clock.now()
}
