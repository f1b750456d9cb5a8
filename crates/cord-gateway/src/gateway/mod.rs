//! Shard orchestration

mod config;
mod gateway;

pub use config::{GatewayConfig, DEFAULT_GATEWAY_URL};
pub use gateway::Gateway;
