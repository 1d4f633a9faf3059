//! Application state for Axum handlers.

use crate::middleware::ApiKeys;
use axum::extract::FromRef;
use chrono::Duration;
use std::sync::Arc;
use stockroom_core::{EventOutbox, ProductCatalog, ReservationManager, StockLedger};

/// Minutes a reservation is held when the request omits `ttl_minutes`.
pub const DEFAULT_RESERVATION_TTL_MINUTES: i64 = 15;

/// Application state shared across all HTTP handlers.
///
/// Every capability is a trait object, so the same router serves the
/// `PostgreSQL` backend and the in-memory one. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Product catalog
    pub catalog: Arc<dyn ProductCatalog>,
    /// Stock ledger
    pub ledger: Arc<dyn StockLedger>,
    /// Reservation state machine
    pub reservations: Arc<dyn ReservationManager>,
    /// Event outbox, for operator queries and the readiness probe
    pub outbox: Arc<dyn EventOutbox>,
    /// TTL for reservations created without one
    pub default_ttl: Duration,
    /// Accepted API keys; empty disables authentication
    pub api_keys: ApiKeys,
}

impl AppState {
    /// Build state from one backend implementing every capability.
    #[must_use]
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ProductCatalog + StockLedger + ReservationManager + EventOutbox + 'static,
    {
        Self {
            catalog: backend.clone(),
            ledger: backend.clone(),
            reservations: backend.clone(),
            outbox: backend,
            default_ttl: Duration::minutes(DEFAULT_RESERVATION_TTL_MINUTES),
            api_keys: ApiKeys::default(),
        }
    }

    /// Set the TTL for reservations created without one.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Require one of `keys` on every API route.
    #[must_use]
    pub fn with_api_keys(mut self, keys: ApiKeys) -> Self {
        self.api_keys = keys;
        self
    }
}

impl FromRef<AppState> for ApiKeys {
    fn from_ref(state: &AppState) -> Self {
        state.api_keys.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_testing::InMemoryInventory;

    #[test]
    fn test_state_is_clone() {
        fn assert_clone<T: Clone + Send + Sync>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_defaults() {
        let state = AppState::from_backend(Arc::new(InMemoryInventory::new()));
        assert_eq!(state.default_ttl, Duration::minutes(15));
        assert!(!state.api_keys.is_enabled());
    }
}
