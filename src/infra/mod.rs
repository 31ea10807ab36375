//! Infrastructure adapters and runtime bootstrap.

pub mod config_store;
pub mod error;
pub mod http;
pub mod telemetry;
