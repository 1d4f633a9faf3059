//! Ledger invariants over random operation histories.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use chrono::Duration;
use proptest::prelude::*;
use std::sync::Arc;
use stockroom_core::{
    EventOutbox, ProductCatalog, ReservationId, ReservationManager, StockLedger, StoreId,
};
use stockroom_testing::fixtures::{hold, new_product};
use stockroom_testing::{InMemoryInventory, ManualClock};

#[derive(Debug, Clone)]
enum Op {
    Reserve { store: usize, quantity: i64, ttl_minutes: i64 },
    Confirm(usize),
    Cancel(usize),
    Adjust { store: usize, delta: i64 },
    Transfer { from: usize, quantity: i64 },
    Advance(i64),
    Sweep,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..2usize, 1..8i64, 1..30i64).prop_map(|(store, quantity, ttl_minutes)| Op::Reserve {
            store,
            quantity,
            ttl_minutes
        }),
        (0..16usize).prop_map(Op::Confirm),
        (0..16usize).prop_map(Op::Cancel),
        (0..2usize, -10..10i64).prop_map(|(store, delta)| Op::Adjust { store, delta }),
        (0..2usize, 1..15i64).prop_map(|(from, quantity)| Op::Transfer { from, quantity }),
        (1..20i64).prop_map(Op::Advance),
        Just(Op::Sweep),
    ]
}

/// Apply `ops`, ignoring refused operations, and report the outcome.
async fn replay(ops: Vec<Op>) -> (InMemoryInventory, i64, usize) {
    let clock = ManualClock::default();
    let inv = InMemoryInventory::with_clock(Arc::new(clock.clone()));
    let product = inv.create_product(new_product("SKU-P")).await.unwrap();
    let stores = [StoreId::new("a"), StoreId::new("b")];
    for store in &stores {
        inv.initialize_stock(product.id, store.clone(), 20)
            .await
            .unwrap();
    }

    let mut holds: Vec<ReservationId> = Vec::new();
    let mut net_adjustment = 0i64;
    let mut accepted = 2usize;
    for op in ops {
        let committed = match op {
            Op::Reserve {
                store,
                quantity,
                ttl_minutes,
            } => inv
                .create_reservation(hold(product.id, &stores[store], "c", quantity, ttl_minutes))
                .await
                .map(|r| holds.push(r.id))
                .is_ok(),
            Op::Confirm(i) => match holds.get(i) {
                Some(id) => match inv.confirm_reservation(*id).await {
                    Ok(r) => {
                        net_adjustment -= r.quantity;
                        true
                    }
                    Err(_) => false,
                },
                None => false,
            },
            Op::Cancel(i) => match holds.get(i) {
                Some(id) => inv.cancel_reservation(*id).await.is_ok(),
                None => false,
            },
            Op::Adjust { store, delta } => match inv
                .adjust_stock(product.id, stores[store].clone(), delta)
                .await
            {
                Ok(_) => {
                    net_adjustment += delta;
                    true
                }
                Err(_) => false,
            },
            Op::Transfer { from, quantity } => inv
                .transfer_stock(
                    product.id,
                    stores[from].clone(),
                    stores[1 - from].clone(),
                    quantity,
                )
                .await
                .is_ok(),
            Op::Advance(minutes) => {
                clock.advance(Duration::minutes(minutes));
                false
            }
            Op::Sweep => {
                accepted += inv.process_expired_reservations().await.unwrap();
                false
            }
        };
        if committed {
            accepted += 1;
        }
    }
    (inv, 40 + net_adjustment, accepted)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ledger_invariants_hold_for_any_history(ops in prop::collection::vec(op(), 0..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (inv, expected_total, accepted) = runtime.block_on(replay(ops));

        // Holds never exceed stock, and they match the pending reservations.
        prop_assert_eq!(inv.invariant_violation().unwrap(), None);

        // Transfers conserve units; only adjustments and confirms change the total.
        let total: i64 = inv.stock_rows().unwrap().iter().map(|s| s.quantity).sum();
        prop_assert_eq!(total, expected_total);

        // One outbox event per committed mutation.
        let events = runtime.block_on(inv.count_unsynced()).unwrap();
        prop_assert_eq!(events, accepted as u64);
    }
}
