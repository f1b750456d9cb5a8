//! Shard lifecycle states

use std::fmt;

/// `Disconnected -> Connecting -> Identifying | Resuming -> Connected -> Disconnected`
///
/// Only [`ShardState::Closed`] is terminal; it is entered when the owner closes
/// the shard or a fatal close code is received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardState {
    Disconnected,
    Connecting,
    Identifying,
    Resuming,
    /// READY or RESUMED received
    Connected,
    Closed,
}

impl ShardState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
