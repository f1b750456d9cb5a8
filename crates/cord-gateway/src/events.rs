//! Events published on the gateway-wide dispatcher

use serde_json::Value;

/// A dispatch event received by one shard
///
/// Published under the event name (`READY`, `MESSAGE_CREATE`, ...).
#[derive(Debug, Clone)]
pub struct ShardEvent {
    pub shard_id: u32,
    pub data: Value,
}
