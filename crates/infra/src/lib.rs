//! Infrastructure layer: configuration, storage backends, schema bootstrap
//! and the seed catalog.

pub mod config;
pub mod schema;
pub mod seed;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use store::{StoreError, StoreResult, Stores};
