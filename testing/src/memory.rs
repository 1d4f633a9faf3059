//! In-memory storage engine.
//!
//! [`InMemoryInventory`] implements all four storage capabilities over one
//! mutex-guarded state. Each operation takes the lock once, works on copies
//! of the rows it touches and writes them back together with its outbox event
//! before releasing the lock, so every operation is atomic and serialized
//! against every other one. Transfers are therefore always atomic.
//!
//! It is the single source of truth for its process: the `memory` database
//! driver runs the service on it, and the cross-crate tests drive it directly.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use stockroom_core::ledger::validate_transfer;
use stockroom_core::stock::ensure_positive;
use stockroom_core::{
    BoxFuture, Clock, CustomerId, EventId, EventOutbox, EventType, ExpireOutcome, InventoryError,
    NewProduct, NewReservation, OutboxEvent, Product, ProductCatalog, ProductId, ProductUpdate,
    Reservation, ReservationId, ReservationManager, ReservationStats, ReservationStatus, Result,
    Stock, StockLedger, StoreId, SystemClock, Transfer,
};

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    stock: BTreeMap<(ProductId, StoreId), Stock>,
    reservations: HashMap<ReservationId, Reservation>,
    /// Append order doubles as the tie-breaker for equal timestamps.
    events: Vec<OutboxEvent>,
}

impl State {
    fn product_exists(&self, id: ProductId) -> Result<()> {
        if self.products.contains_key(&id) {
            Ok(())
        } else {
            Err(InventoryError::product_not_found(id))
        }
    }

    fn stock(&self, product_id: ProductId, store_id: &StoreId) -> Result<Stock> {
        self.stock
            .get(&(product_id, store_id.clone()))
            .cloned()
            .ok_or_else(|| InventoryError::stock_not_found(product_id, store_id))
    }

    fn reservation(&self, id: ReservationId) -> Result<Reservation> {
        self.reservations
            .get(&id)
            .cloned()
            .ok_or_else(|| InventoryError::reservation_not_found(id))
    }

    fn put_stock(&mut self, stock: Stock) {
        self.stock
            .insert((stock.product_id, stock.store_id.clone()), stock);
    }

    fn put_reservation(&mut self, reservation: Reservation) {
        self.reservations.insert(reservation.id, reservation);
    }

    /// Apply `change` to a copy of the row, then store it with its event.
    fn mutate_stock(
        &mut self,
        product_id: ProductId,
        store_id: &StoreId,
        now: DateTime<Utc>,
        change: impl FnOnce(&mut Stock) -> Result<()>,
    ) -> Result<Stock> {
        let before = self.stock(product_id, store_id)?;
        let mut after = before.clone();
        change(&mut after)?;
        self.events
            .push(OutboxEvent::stock_updated(&before, &after, now));
        self.put_stock(after.clone());
        Ok(after)
    }

    /// Move a `PENDING` reservation to a terminal state, running the paired
    /// ledger operation on its stock row.
    fn finish_reservation(
        &mut self,
        mut reservation: Reservation,
        to: ReservationStatus,
        now: DateTime<Utc>,
    ) -> Result<Reservation> {
        let mut stock = self.stock(reservation.product_id, &reservation.store_id)?;
        match to {
            ReservationStatus::Confirmed => stock.confirm(reservation.quantity, now)?,
            _ => stock.release(reservation.quantity, now)?,
        }
        reservation.transition(to, now)?;

        let event_type = match to {
            ReservationStatus::Confirmed => EventType::ReservationConfirmed,
            ReservationStatus::Cancelled => EventType::ReservationCancelled,
            _ => EventType::ReservationExpired,
        };
        self.put_stock(stock);
        self.put_reservation(reservation.clone());
        self.events
            .push(OutboxEvent::for_reservation(event_type, &reservation, now));
        record_transition(to);
        Ok(reservation)
    }

    fn is_referenced(&self, product_id: ProductId) -> bool {
        self.stock.keys().any(|(pid, _)| *pid == product_id)
            || self
                .reservations
                .values()
                .any(|r| r.product_id == product_id)
    }
}

fn record_transition(status: ReservationStatus) {
    metrics::counter!("stockroom_reservations_total", "status" => status.as_str()).increment(1);
}

/// Sort key for replay order: timestamp first, append order second.
fn replay_order(events: &mut [(usize, OutboxEvent)]) {
    events.sort_by_key(|(seq, e)| (e.created_at, *seq));
}

/// In-memory implementation of every storage capability.
///
/// Clones share the same state.
///
/// # Example
///
/// ```
/// use stockroom_testing::InMemoryInventory;
/// use stockroom_core::{NewProduct, ProductCatalog, StockLedger, StoreId};
///
/// # async fn example() -> stockroom_core::Result<()> {
/// let inventory = InMemoryInventory::new();
/// let product = inventory
///     .create_product(NewProduct {
///         sku: "SKU-1".into(),
///         name: "Widget".into(),
///         category: "tools".into(),
///         price: 9.5,
///     })
///     .await?;
/// let stock = inventory.initialize_stock(product.id, StoreId::new("s1"), 100).await?;
/// assert_eq!(stock.available(), 100);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryInventory {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryInventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryInventory").finish_non_exhaustive()
    }
}

impl InMemoryInventory {
    /// Create an empty inventory on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty inventory reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| InventoryError::infrastructure("in-memory state lock poisoned"))
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Every outbox event in append order.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Infrastructure`] if the state lock is poisoned.
    pub fn events(&self) -> Result<Vec<OutboxEvent>> {
        Ok(self.lock()?.events.clone())
    }

    /// Every stock row, ordered by `(product_id, store_id)`.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Infrastructure`] if the state lock is poisoned.
    pub fn stock_rows(&self) -> Result<Vec<Stock>> {
        Ok(self.lock()?.stock.values().cloned().collect())
    }

    /// Every reservation, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Infrastructure`] if the state lock is poisoned.
    pub fn reservations(&self) -> Result<Vec<Reservation>> {
        Ok(self.lock()?.reservations.values().cloned().collect())
    }

    /// Check the ledger invariants over the whole state.
    ///
    /// Returns a description of the first violation found: a row outside
    /// `0 <= reserved <= quantity`, or a row whose `reserved` differs from
    /// the sum of its `PENDING` reservations.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Infrastructure`] if the state lock is poisoned.
    pub fn invariant_violation(&self) -> Result<Option<String>> {
        let state = self.lock()?;
        let mut held: HashMap<(ProductId, StoreId), i64> = HashMap::new();
        for r in state.reservations.values() {
            if r.status == ReservationStatus::Pending {
                *held.entry((r.product_id, r.store_id.clone())).or_default() += r.quantity;
            }
        }
        for (key, stock) in &state.stock {
            if !stock.is_consistent() {
                return Ok(Some(format!(
                    "stock {}/{} has quantity {} and reserved {}",
                    stock.product_id, stock.store_id, stock.quantity, stock.reserved
                )));
            }
            let pending = held.get(key).copied().unwrap_or(0);
            if pending != stock.reserved {
                return Ok(Some(format!(
                    "stock {}/{} has reserved {} but pending reservations hold {pending}",
                    stock.product_id, stock.store_id, stock.reserved
                )));
            }
        }
        Ok(None)
    }

    // Catalog

    fn create_product_sync(&self, product: NewProduct) -> Result<Product> {
        product.validate()?;
        let product = product.into_product(self.now());
        let mut state = self.lock()?;
        if state.products.values().any(|p| p.sku == product.sku) {
            return Err(InventoryError::conflict(format!(
                "product with sku {} already exists",
                product.sku
            )));
        }
        state.products.insert(product.id, product.clone());
        tracing::info!(product_id = %product.id, sku = %product.sku, "Product created");
        Ok(product)
    }

    fn get_product_sync(&self, id: ProductId) -> Result<Product> {
        self.lock()?
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| InventoryError::product_not_found(id))
    }

    fn list_products_sync(&self, category: Option<&str>) -> Result<Vec<Product>> {
        let state = self.lock()?;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| category.is_none_or(|c| p.category == c))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(products)
    }

    fn update_product_sync(&self, id: ProductId, update: ProductUpdate) -> Result<Product> {
        update.validate()?;
        let now = self.now();
        let mut state = self.lock()?;
        let product = state
            .products
            .get_mut(&id)
            .ok_or_else(|| InventoryError::product_not_found(id))?;
        update.apply(product, now);
        Ok(product.clone())
    }

    fn delete_product_sync(&self, id: ProductId) -> Result<()> {
        let mut state = self.lock()?;
        state.product_exists(id)?;
        if state.is_referenced(id) {
            return Err(InventoryError::conflict(format!(
                "product {id} is still referenced"
            )));
        }
        state.products.remove(&id);
        Ok(())
    }

    // Ledger

    fn initialize_stock_sync(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        initial_quantity: i64,
    ) -> Result<Stock> {
        let now = self.now();
        let stock = Stock::initialize(product_id, store_id, initial_quantity, now)?;
        let mut state = self.lock()?;
        state.product_exists(product_id)?;
        if state
            .stock
            .contains_key(&(product_id, stock.store_id.clone()))
        {
            return Err(InventoryError::conflict(format!(
                "stock for product {product_id} in store {} already exists",
                stock.store_id
            )));
        }
        state.events.push(OutboxEvent::stock_created(&stock, now));
        state.put_stock(stock.clone());
        tracing::info!(product_id = %product_id, store_id = %stock.store_id, quantity = initial_quantity, "Stock initialized");
        Ok(stock)
    }

    fn get_stock_sync(&self, product_id: ProductId, store_id: &StoreId) -> Result<Stock> {
        self.lock()?.stock(product_id, store_id)
    }

    fn list_stock_sync(&self, keep: impl Fn(&Stock) -> bool) -> Result<Vec<Stock>> {
        Ok(self
            .lock()?
            .stock
            .values()
            .filter(|s| keep(s))
            .cloned()
            .collect())
    }

    fn update_quantity_sync(
        &self,
        product_id: ProductId,
        store_id: &StoreId,
        new_quantity: i64,
    ) -> Result<Stock> {
        let now = self.now();
        self.lock()?
            .mutate_stock(product_id, store_id, now, |s| s.set_quantity(new_quantity, now))
    }

    fn adjust_stock_sync(
        &self,
        product_id: ProductId,
        store_id: &StoreId,
        delta: i64,
    ) -> Result<Stock> {
        let now = self.now();
        self.lock()?.mutate_stock(product_id, store_id, now, |s| {
            let new_quantity = s.adjusted_quantity(delta)?;
            s.set_quantity(new_quantity, now)
        })
    }

    fn reserve_stock_sync(&self, product_id: ProductId, store_id: &StoreId, n: i64) -> Result<Stock> {
        ensure_positive(n, "quantity")?;
        let now = self.now();
        self.lock()?
            .mutate_stock(product_id, store_id, now, |s| s.reserve(n, now))
    }

    fn release_stock_sync(&self, product_id: ProductId, store_id: &StoreId, n: i64) -> Result<Stock> {
        ensure_positive(n, "quantity")?;
        let now = self.now();
        self.lock()?
            .mutate_stock(product_id, store_id, now, |s| s.release(n, now))
    }

    fn confirm_stock_sync(&self, product_id: ProductId, store_id: &StoreId, n: i64) -> Result<Stock> {
        ensure_positive(n, "quantity")?;
        let now = self.now();
        self.lock()?
            .mutate_stock(product_id, store_id, now, |s| s.confirm(n, now))
    }

    fn transfer_stock_sync(
        &self,
        product_id: ProductId,
        from: &StoreId,
        to: &StoreId,
        n: i64,
    ) -> Result<Transfer> {
        validate_transfer(from, to, n)?;
        let now = self.now();
        let mut state = self.lock()?;
        let mut source = state.stock(product_id, from)?;
        let mut destination = state.stock(product_id, to)?;
        source.check_transfer_out(n)?;

        let credited = destination.credited_quantity(n)?;
        source.set_quantity(source.quantity - n, now)?;
        destination.set_quantity(credited, now)?;

        state
            .events
            .push(OutboxEvent::stock_transferred(&source, to, n, now));
        state.put_stock(source.clone());
        state.put_stock(destination.clone());
        tracing::info!(product_id = %product_id, from = %from, to = %to, quantity = n, "Stock transferred");
        Ok(Transfer {
            source,
            destination,
        })
    }

    fn check_availability_sync(&self, product_id: ProductId, store_id: &StoreId, n: i64) -> Result<bool> {
        ensure_positive(n, "quantity")?;
        Ok(self.get_stock_sync(product_id, store_id)?.available() >= n)
    }

    fn low_stock_sync(&self, threshold: i64) -> Result<Vec<Stock>> {
        if threshold < 0 {
            return Err(InventoryError::validation("threshold must be non-negative"));
        }
        let mut rows = self.list_stock_sync(|s| s.available() <= threshold)?;
        rows.sort_by(|a, b| {
            (a.available(), a.product_id, &a.store_id).cmp(&(b.available(), b.product_id, &b.store_id))
        });
        Ok(rows)
    }

    // Reservations

    fn create_reservation_sync(&self, request: NewReservation) -> Result<Reservation> {
        request.validate()?;
        let now = self.now();
        let reservation = request.into_reservation(now)?;

        let mut state = self.lock()?;
        state.product_exists(reservation.product_id)?;
        let mut stock = state.stock(reservation.product_id, &reservation.store_id)?;
        stock.reserve(reservation.quantity, now)?;

        state.put_stock(stock);
        state.put_reservation(reservation.clone());
        state.events.push(OutboxEvent::for_reservation(
            EventType::ReservationCreated,
            &reservation,
            now,
        ));
        record_transition(ReservationStatus::Pending);
        tracing::info!(reservation_id = %reservation.id, expires_at = %reservation.expires_at, "Reservation created");
        Ok(reservation)
    }

    fn list_by_customer_sync(&self, customer_id: &CustomerId) -> Result<Vec<Reservation>> {
        let state = self.lock()?;
        let mut found: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| &r.customer_id == customer_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    fn confirm_reservation_sync(&self, id: ReservationId) -> Result<Reservation> {
        let now = self.now();
        let mut state = self.lock()?;
        let reservation = state.reservation(id)?;
        reservation.ensure_confirmable(now)?;
        state.finish_reservation(reservation, ReservationStatus::Confirmed, now)
    }

    fn cancel_reservation_sync(&self, id: ReservationId) -> Result<Reservation> {
        let now = self.now();
        let mut state = self.lock()?;
        let reservation = state.reservation(id)?;
        reservation.ensure_pending()?;
        state.finish_reservation(reservation, ReservationStatus::Cancelled, now)
    }

    fn expire_reservation_sync(&self, id: ReservationId) -> Result<ExpireOutcome> {
        let now = self.now();
        let mut state = self.lock()?;
        let reservation = state.reservation(id)?;
        if reservation.status.is_terminal() {
            return Ok(ExpireOutcome::AlreadyTerminal);
        }
        if !reservation.is_expired_at(now) {
            return Ok(ExpireOutcome::NotDue);
        }
        state.finish_reservation(reservation, ReservationStatus::Expired, now)?;
        Ok(ExpireOutcome::Expired)
    }

    fn process_expired_sync(&self) -> Result<usize> {
        let now = self.now();
        let mut due: Vec<(DateTime<Utc>, ReservationId)> = self
            .lock()?
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Pending && r.is_expired_at(now))
            .map(|r| (r.expires_at, r.id))
            .collect();
        due.sort();

        let mut expired = 0usize;
        for (_, id) in due {
            match self.expire_reservation_sync(id) {
                Ok(ExpireOutcome::Expired) => expired += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(reservation_id = %id, error = %e, "Failed to expire reservation");
                }
            }
        }
        Ok(expired)
    }

    fn reservation_stats_sync(&self) -> Result<ReservationStats> {
        let state = self.lock()?;
        let mut stats = ReservationStats::default();
        for r in state.reservations.values() {
            stats.add(r.status, 1);
        }
        Ok(stats)
    }

    fn purge_terminal_sync(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut state = self.lock()?;
        let before = state.reservations.len();
        state
            .reservations
            .retain(|_, r| !(r.status.is_terminal() && r.updated_at < older_than));
        let purged = (before - state.reservations.len()) as u64;
        tracing::info!(purged, older_than = %older_than, "Terminal reservations purged");
        Ok(purged)
    }

    // Outbox

    fn fetch_unsynced_sync(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        let state = self.lock()?;
        let mut pending: Vec<(usize, OutboxEvent)> = state
            .events
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.synced)
            .map(|(seq, e)| (seq, e.clone()))
            .collect();
        replay_order(&mut pending);
        Ok(pending.into_iter().take(limit).map(|(_, e)| e).collect())
    }

    fn mark_synced_sync(&self, ids: &[EventId], at: DateTime<Utc>) -> Result<usize> {
        let ids: HashSet<EventId> = ids.iter().copied().collect();
        let mut state = self.lock()?;
        let mut marked = 0usize;
        for event in state.events.iter_mut().filter(|e| ids.contains(&e.id)) {
            if !event.synced {
                event.synced = true;
                event.synced_at = Some(at);
                marked += 1;
            }
        }
        Ok(marked)
    }

    fn cleanup_old_events_sync(&self, days_old: u32) -> Result<u64> {
        let cutoff = self.now() - Duration::days(i64::from(days_old));
        let mut state = self.lock()?;
        let before = state.events.len();
        state
            .events
            .retain(|e| !(e.synced && e.synced_at.is_some_and(|at| at < cutoff)));
        let deleted = (before - state.events.len()) as u64;
        tracing::info!(deleted, days_old, "Old synced events removed");
        Ok(deleted)
    }

    fn events_for_aggregate_sync(&self, aggregate_id: &str) -> Result<Vec<OutboxEvent>> {
        let state = self.lock()?;
        let mut matching: Vec<(usize, OutboxEvent)> = state
            .events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.aggregate_id == aggregate_id)
            .map(|(seq, e)| (seq, e.clone()))
            .collect();
        replay_order(&mut matching);
        Ok(matching.into_iter().map(|(_, e)| e).collect())
    }

    fn count_unsynced_sync(&self) -> Result<u64> {
        Ok(self.lock()?.events.iter().filter(|e| !e.synced).count() as u64)
    }
}

impl ProductCatalog for InMemoryInventory {
    fn create_product(&self, product: NewProduct) -> BoxFuture<'_, Result<Product>> {
        Box::pin(async move { self.create_product_sync(product) })
    }

    fn get_product(&self, id: ProductId) -> BoxFuture<'_, Result<Product>> {
        Box::pin(async move { self.get_product_sync(id) })
    }

    fn list_products(&self, category: Option<String>) -> BoxFuture<'_, Result<Vec<Product>>> {
        Box::pin(async move { self.list_products_sync(category.as_deref()) })
    }

    fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> BoxFuture<'_, Result<Product>> {
        Box::pin(async move { self.update_product_sync(id, update) })
    }

    fn delete_product(&self, id: ProductId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.delete_product_sync(id) })
    }
}

impl StockLedger for InMemoryInventory {
    fn initialize_stock(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        initial_quantity: i64,
    ) -> BoxFuture<'_, Result<Stock>> {
        Box::pin(async move { self.initialize_stock_sync(product_id, store_id, initial_quantity) })
    }

    fn get_stock(&self, product_id: ProductId, store_id: StoreId) -> BoxFuture<'_, Result<Stock>> {
        Box::pin(async move { self.get_stock_sync(product_id, &store_id) })
    }

    fn list_stock_by_store(&self, store_id: StoreId) -> BoxFuture<'_, Result<Vec<Stock>>> {
        Box::pin(async move { self.list_stock_sync(|s| s.store_id == store_id) })
    }

    fn list_stock_by_product(&self, product_id: ProductId) -> BoxFuture<'_, Result<Vec<Stock>>> {
        Box::pin(async move { self.list_stock_sync(|s| s.product_id == product_id) })
    }

    fn update_quantity(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        new_quantity: i64,
    ) -> BoxFuture<'_, Result<Stock>> {
        Box::pin(async move { self.update_quantity_sync(product_id, &store_id, new_quantity) })
    }

    fn adjust_stock(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        delta: i64,
    ) -> BoxFuture<'_, Result<Stock>> {
        Box::pin(async move { self.adjust_stock_sync(product_id, &store_id, delta) })
    }

    fn reserve_stock(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        n: i64,
    ) -> BoxFuture<'_, Result<Stock>> {
        Box::pin(async move { self.reserve_stock_sync(product_id, &store_id, n) })
    }

    fn release_reserved_stock(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        n: i64,
    ) -> BoxFuture<'_, Result<Stock>> {
        Box::pin(async move { self.release_stock_sync(product_id, &store_id, n) })
    }

    fn confirm_reserved_stock(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        n: i64,
    ) -> BoxFuture<'_, Result<Stock>> {
        Box::pin(async move { self.confirm_stock_sync(product_id, &store_id, n) })
    }

    fn transfer_stock(
        &self,
        product_id: ProductId,
        from_store_id: StoreId,
        to_store_id: StoreId,
        n: i64,
    ) -> BoxFuture<'_, Result<Transfer>> {
        Box::pin(async move { self.transfer_stock_sync(product_id, &from_store_id, &to_store_id, n) })
    }

    fn check_availability(
        &self,
        product_id: ProductId,
        store_id: StoreId,
        n: i64,
    ) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { self.check_availability_sync(product_id, &store_id, n) })
    }

    fn low_stock_items(&self, threshold: i64) -> BoxFuture<'_, Result<Vec<Stock>>> {
        Box::pin(async move { self.low_stock_sync(threshold) })
    }
}

impl ReservationManager for InMemoryInventory {
    fn create_reservation(&self, request: NewReservation) -> BoxFuture<'_, Result<Reservation>> {
        Box::pin(async move { self.create_reservation_sync(request) })
    }

    fn get_reservation(&self, id: ReservationId) -> BoxFuture<'_, Result<Reservation>> {
        Box::pin(async move { self.lock()?.reservation(id) })
    }

    fn list_reservations_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> BoxFuture<'_, Result<Vec<Reservation>>> {
        Box::pin(async move { self.list_by_customer_sync(&customer_id) })
    }

    fn confirm_reservation(&self, id: ReservationId) -> BoxFuture<'_, Result<Reservation>> {
        Box::pin(async move { self.confirm_reservation_sync(id) })
    }

    fn cancel_reservation(&self, id: ReservationId) -> BoxFuture<'_, Result<Reservation>> {
        Box::pin(async move { self.cancel_reservation_sync(id) })
    }

    fn expire_reservation(&self, id: ReservationId) -> BoxFuture<'_, Result<ExpireOutcome>> {
        Box::pin(async move { self.expire_reservation_sync(id) })
    }

    fn process_expired_reservations(&self) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move { self.process_expired_sync() })
    }

    fn reservation_stats(&self) -> BoxFuture<'_, Result<ReservationStats>> {
        Box::pin(async move { self.reservation_stats_sync() })
    }

    fn purge_terminal_reservations(
        &self,
        older_than: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move { self.purge_terminal_sync(older_than) })
    }
}

impl EventOutbox for InMemoryInventory {
    fn fetch_unsynced(&self, limit: usize) -> BoxFuture<'_, Result<Vec<OutboxEvent>>> {
        Box::pin(async move { self.fetch_unsynced_sync(limit) })
    }

    fn mark_synced(&self, ids: Vec<EventId>, at: DateTime<Utc>) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move { self.mark_synced_sync(&ids, at) })
    }

    fn cleanup_old_events(&self, days_old: u32) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move { self.cleanup_old_events_sync(days_old) })
    }

    fn events_for_aggregate(
        &self,
        aggregate_id: String,
    ) -> BoxFuture<'_, Result<Vec<OutboxEvent>>> {
        Box::pin(async move { self.events_for_aggregate_sync(&aggregate_id) })
    }

    fn count_unsynced(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move { self.count_unsynced_sync() })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fixtures::{hold, new_product};

    fn inventory() -> (InMemoryInventory, ManualClock) {
        let clock = ManualClock::default();
        (InMemoryInventory::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn initialize_requires_existing_product() {
        let (inv, _) = inventory();
        let err = inv
            .initialize_stock(ProductId::new(), StoreId::new("s1"), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::NotFound { entity: "product", .. }));
    }

    #[tokio::test]
    async fn duplicate_stock_row_is_conflict() {
        let (inv, _) = inventory();
        let product = inv.create_product(new_product("SKU-1")).await.unwrap();
        inv.initialize_stock(product.id, StoreId::new("s1"), 5)
            .await
            .unwrap();
        let err = inv
            .initialize_stock(product.id, StoreId::new("s1"), 7)
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Conflict(_)));
        assert_eq!(inv.events().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejected_mutation_leaves_no_event() {
        let (inv, _) = inventory();
        let product = inv.create_product(new_product("SKU-1")).await.unwrap();
        let store = StoreId::new("s1");
        inv.initialize_stock(product.id, store.clone(), 2)
            .await
            .unwrap();

        let err = inv
            .reserve_stock(product.id, store.clone(), 3)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientStock {
                available: 2,
                requested: 3
            }
        );
        assert_eq!(inv.events().unwrap().len(), 1);
        assert_eq!(inv.get_stock(product.id, store).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn delete_product_blocked_while_stocked() {
        let (inv, _) = inventory();
        let product = inv.create_product(new_product("SKU-1")).await.unwrap();
        inv.initialize_stock(product.id, StoreId::new("s1"), 1)
            .await
            .unwrap();
        assert!(matches!(
            inv.delete_product(product.id).await,
            Err(InventoryError::Conflict(_))
        ));

        let lone = inv.create_product(new_product("SKU-2")).await.unwrap();
        inv.delete_product(lone.id).await.unwrap();
        assert!(matches!(
            inv.get_product(lone.id).await,
            Err(InventoryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_sku_is_conflict() {
        let (inv, _) = inventory();
        inv.create_product(new_product("SKU-1")).await.unwrap();
        assert!(matches!(
            inv.create_product(new_product("SKU-1")).await,
            Err(InventoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn expire_is_idempotent_and_releases_once() {
        let (inv, clock) = inventory();
        let product = inv.create_product(new_product("SKU-1")).await.unwrap();
        let store = StoreId::new("s1");
        inv.initialize_stock(product.id, store.clone(), 10)
            .await
            .unwrap();
        let r = inv
            .create_reservation(hold(product.id, &store, "c1", 4, 15))
            .await
            .unwrap();

        assert_eq!(
            inv.expire_reservation(r.id).await.unwrap(),
            ExpireOutcome::NotDue
        );
        clock.advance(Duration::minutes(16));
        assert_eq!(
            inv.expire_reservation(r.id).await.unwrap(),
            ExpireOutcome::Expired
        );
        assert_eq!(
            inv.expire_reservation(r.id).await.unwrap(),
            ExpireOutcome::AlreadyTerminal
        );

        let stock = inv.get_stock(product.id, store).await.unwrap();
        assert_eq!((stock.quantity, stock.reserved), (10, 0));
        assert!(inv.invariant_violation().unwrap().is_none());
    }

    #[tokio::test]
    async fn replay_order_breaks_timestamp_ties_by_append_order() {
        let (inv, _) = inventory();
        let product = inv.create_product(new_product("SKU-1")).await.unwrap();
        let store = StoreId::new("s1");
        inv.initialize_stock(product.id, store.clone(), 10)
            .await
            .unwrap();
        inv.adjust_stock(product.id, store.clone(), 5).await.unwrap();
        inv.adjust_stock(product.id, store, -3).await.unwrap();

        let events = inv.fetch_unsynced(10).await.unwrap();
        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            [
                EventType::StockCreated,
                EventType::StockUpdated,
                EventType::StockUpdated
            ]
        );
        assert_eq!(events[2].payload["new_quantity"], 12);
        assert_eq!(inv.fetch_unsynced(1).await.unwrap()[0].id, events[0].id);
    }

    #[tokio::test]
    async fn cleanup_only_removes_old_synced_events() {
        let (inv, clock) = inventory();
        let product = inv.create_product(new_product("SKU-1")).await.unwrap();
        let store = StoreId::new("s1");
        inv.initialize_stock(product.id, store.clone(), 10)
            .await
            .unwrap();
        inv.adjust_stock(product.id, store, 1).await.unwrap();

        let first = inv.fetch_unsynced(1).await.unwrap();
        let marked = inv
            .mark_synced(vec![first[0].id], clock.now())
            .await
            .unwrap();
        assert_eq!(marked, 1);
        // Marking again changes nothing.
        assert_eq!(
            inv.mark_synced(vec![first[0].id], clock.now())
                .await
                .unwrap(),
            0
        );

        assert_eq!(inv.cleanup_old_events(7).await.unwrap(), 0);
        clock.advance(Duration::days(8));
        assert_eq!(inv.cleanup_old_events(7).await.unwrap(), 1);
        assert_eq!(inv.count_unsynced().await.unwrap(), 1);
    }
}
