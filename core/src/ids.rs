//! Strongly typed identifiers for products, stores, customers, stock rows,
//! reservations and outbox events.
//!
//! Two families of identifiers exist:
//!
//! - **Opaque UUIDs** generated by the system ([`ProductId`], [`StockId`],
//!   [`ReservationId`], [`EventId`]). Event ids are random 128-bit values; their
//!   hyphenated lowercase rendering is the stable form consumers deduplicate on.
//! - **Caller-supplied names** ([`StoreId`], [`CustomerId`]). These are free-form
//!   strings owned by upstream systems (store codes, customer accounts).
//!
//! # Validation
//!
//! - `FromStr::from_str()`: Validates input (rejects empty or blank strings)
//! - `From::from()` and `new()`: No validation (for trusted, application-controlled data)
//!
//! Use `FromStr` when parsing external input.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error type for identifier parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {kind}: {reason}")]
pub struct ParseIdError {
    kind: &'static str,
    reason: String,
}

impl ParseIdError {
    fn new(kind: &'static str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|e| ParseIdError::new($kind, e.to_string()))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

macro_rules! name_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Create a new `", stringify!($name), "` from a string.")]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is empty or whitespace only.
            #[must_use]
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }

            /// Convert into the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(ParseIdError::new($kind, "cannot be empty"));
                }
                Ok(Self(trimmed.to_string()))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a catalog product.
    ProductId,
    "product id"
);

uuid_id!(
    /// Surrogate key of a stock row. The natural key is `(ProductId, StoreId)`.
    StockId,
    "stock id"
);

uuid_id!(
    /// Unique identifier for a reservation.
    ReservationId,
    "reservation id"
);

uuid_id!(
    /// Globally unique outbox event identifier.
    ///
    /// Consumers deduplicate on this value; the sync engine may publish the same
    /// event more than once after a crash.
    EventId,
    "event id"
);

name_id!(
    /// Identifier of a physical or virtual store.
    StoreId,
    "store id"
);

name_id!(
    /// Identifier of the customer holding a reservation.
    CustomerId,
    "customer id"
);

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn event_id_renders_hyphenated_lowercase() {
        let uuid = Uuid::parse_str("6F9619FF-8B86-D011-B42D-00C04FC964FF").unwrap();
        let id = EventId::from_uuid(uuid);
        assert_eq!(id.to_string(), "6f9619ff-8b86-d011-b42d-00c04fc964ff");
    }

    #[test]
    fn event_ids_are_unique() {
        let a = EventId::new();
        let b = EventId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn store_id_rejects_blank_input() {
        assert!("   ".parse::<StoreId>().is_err());
        assert_eq!("  s1 ".parse::<StoreId>().unwrap(), StoreId::new("s1"));
    }

    #[test]
    fn product_id_parse_error_names_the_kind() {
        let err = "not-a-uuid".parse::<ProductId>().unwrap_err();
        assert!(err.to_string().starts_with("Invalid product id"));
    }

    #[test]
    fn store_ids_order_lexicographically() {
        let mut ids = vec![StoreId::new("b"), StoreId::new("a"), StoreId::new("c")];
        ids.sort();
        assert_eq!(ids, vec![StoreId::new("a"), StoreId::new("b"), StoreId::new("c")]);
    }
}
