//! The seam between a shard and whatever owns it

use super::Shard;
use crate::error::{GatewayError, GatewayResult};
use cord_core::TimesPer;

/// Owner-side decisions a shard defers to
///
/// Implemented by [`crate::Gateway`]. Shards keep only a weak reference, so a
/// dropped owner simply stops reconnects.
pub trait ShardSupervisor: Send + Sync {
    /// Limiter every Identify of `shard_id` must pass
    ///
    /// # Errors
    /// [`GatewayError::ConcurrencyUnknown`] before the identify concurrency is known
    fn identify_limiter(&self, shard_id: u32) -> GatewayResult<TimesPer>;

    /// Whether `shard` may reconnect after losing its connection
    fn should_reconnect(&self, shard: &Shard) -> bool;

    /// Record an error that must shut the client down
    fn report_fatal(&self, error: GatewayError);
}
