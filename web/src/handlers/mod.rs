//! HTTP request handlers.
//!
//! This module contains all HTTP handlers organized by domain.

pub mod events;
pub mod health;
pub mod products;
pub mod reservations;
pub mod stock;

pub use health::{health_check, readiness_check};
