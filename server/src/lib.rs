//! # Stockroom Server
//!
//! The deployable inventory service: configuration, wiring and lifecycle
//! around the storage backends, the HTTP surface and the background workers.
//!
//! ## Startup
//!
//! 1. [`Config::from_env`] reads the environment (after `.env`)
//! 2. [`ApplicationBuilder`] opens storage, runs migrations, connects the
//!    publisher and binds the listener
//! 3. [`Application::run`] serves until Ctrl+C or SIGTERM, then stops the
//!    workers and closes the publisher

pub mod bootstrap;
pub mod config;
pub mod lifecycle;

pub use bootstrap::ApplicationBuilder;
pub use config::{
    BrokerConfig, Config, ConfigError, DatabaseConfig, DatabaseDriver, MessageBroker, ServerConfig,
    WorkerConfig,
};
pub use lifecycle::{Application, Workers};
