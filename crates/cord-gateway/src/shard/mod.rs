//! Shard connection lifecycle

mod inflater;
mod shard;
mod state;
mod supervisor;

pub use inflater::{Inflater, ZLIB_SUFFIX};
pub use shard::{
    Shard, ShardConfig, DEFAULT_RECONNECT_DELAY, DEFAULT_SEND_LIMIT, DEFAULT_SEND_PERIOD,
};
pub use state::ShardState;
pub use supervisor::ShardSupervisor;
