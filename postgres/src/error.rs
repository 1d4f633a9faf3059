//! Mapping of `sqlx` errors onto the inventory error taxonomy.
//!
//! | SQLSTATE | Meaning | Mapped to |
//! |---|---|---|
//! | `23505` | unique violation | [`InventoryError::Conflict`] |
//! | `23503` | foreign-key violation | [`InventoryError::NotFound`] |
//! | `23514` | check violation | [`InventoryError::Conflict`] |
//! | anything else | | [`InventoryError::Infrastructure`] |

use stockroom_core::InventoryError;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

/// Map a `sqlx` error raised while doing `context`.
pub(crate) fn map_sqlx(context: &str, error: sqlx::Error) -> InventoryError {
    if let Some(db) = error.as_database_error() {
        let constraint = db.constraint().unwrap_or("unknown").to_string();
        match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => {
                return InventoryError::conflict(format!(
                    "{context}: duplicate key violates {constraint}"
                ));
            }
            Some(FOREIGN_KEY_VIOLATION) => {
                return InventoryError::NotFound {
                    entity: referenced_entity(&constraint),
                    id: constraint,
                };
            }
            Some(CHECK_VIOLATION) => {
                return InventoryError::conflict(format!(
                    "{context}: row violates {constraint}"
                ));
            }
            _ => {}
        }
    }
    InventoryError::infrastructure(format!("{context}: {error}"))
}

/// Closure form of [`map_sqlx`] for `map_err`.
pub(crate) fn db(context: &'static str) -> impl FnOnce(sqlx::Error) -> InventoryError {
    move |error| map_sqlx(context, error)
}

fn referenced_entity(constraint: &str) -> &'static str {
    if constraint.contains("product") {
        "product"
    } else {
        "reference"
    }
}
