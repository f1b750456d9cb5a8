//! # cord-gateway
//!
//! Sharded websocket client for the real-time gateway. A [`Gateway`] discovers
//! the shard count, meters identify attempts and supervises its [`Shard`]s;
//! each shard runs its own connection lifecycle and publishes decoded events.

pub mod error;
pub mod events;
pub mod gateway;
pub mod protocol;
pub mod shard;

pub use error::{GatewayError, GatewayResult};
pub use events::ShardEvent;
pub use gateway::{Gateway, GatewayConfig};
pub use protocol::{CloseCode, GatewayMessage, OpCode};
pub use shard::{Shard, ShardConfig, ShardState, ShardSupervisor};
