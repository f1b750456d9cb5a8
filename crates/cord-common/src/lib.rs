//! # cord-common
//!
//! Shared utilities: environment configuration and tracing setup.

pub mod config;
pub mod telemetry;

pub use config::{ClientConfig, ConfigError, Environment};
pub use telemetry::{try_init_tracing, try_init_tracing_with_config, TracingConfig, TracingError};
