//! Request builders shared by tests.

use chrono::Duration;
use stockroom_core::{CustomerId, NewProduct, NewReservation, ProductId, StoreId};

/// A valid product with the given SKU.
#[must_use]
pub fn new_product(sku: &str) -> NewProduct {
    NewProduct {
        sku: sku.to_string(),
        name: format!("Product {sku}"),
        category: "general".to_string(),
        price: 10.0,
    }
}

/// A reservation request for `quantity` units held for `ttl_minutes`.
#[must_use]
pub fn hold(
    product_id: ProductId,
    store_id: &StoreId,
    customer: &str,
    quantity: i64,
    ttl_minutes: i64,
) -> NewReservation {
    NewReservation {
        product_id,
        store_id: store_id.clone(),
        customer_id: CustomerId::new(customer),
        quantity,
        ttl: Duration::minutes(ttl_minutes),
    }
}
