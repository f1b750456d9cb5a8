//! Gateway error types

use crate::protocol::CloseCode;
use cord_http::HttpError;
use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("WebSocket error: {0}")]
    Transport(Box<tungstenite::Error>),

    /// The shard or its connection went away; left to the reconnect path
    #[error("Shard {shard_id} is closed")]
    ShardClosed { shard_id: u32 },

    /// Sent before the shard ever connected
    #[error("Shard {shard_id} has not been connected")]
    NotConnected { shard_id: u32 },

    #[error("Privileged intents were requested but are not enabled for this application")]
    PrivilegedIntentsRequired,

    #[error("Gateway rejected the token")]
    AuthenticationFailed,

    #[error("The gateway requires more shards than the configured shard count")]
    NotEnoughShards,

    #[error("Unexpected close code: {0}")]
    UnexpectedCloseCode(CloseCode),

    /// Identify limiter requested before discovery reported the concurrency
    #[error("Identify concurrency is not known yet")]
    ConcurrencyUnknown,

    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl GatewayError {
    /// Whether the error must shut the whole client down
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PrivilegedIntentsRequired
                | Self::AuthenticationFailed
                | Self::NotEnoughShards
                | Self::UnexpectedCloseCode(_)
                | Self::ConcurrencyUnknown
        )
    }

    /// Error surfaced for a close code that must not be retried
    #[must_use]
    pub fn from_close_code(code: CloseCode) -> Self {
        match code {
            CloseCode::AuthenticationFailed => Self::AuthenticationFailed,
            CloseCode::DisallowedIntents => Self::PrivilegedIntentsRequired,
            other => Self::UnexpectedCloseCode(other),
        }
    }
}

impl From<tungstenite::Error> for GatewayError {
    fn from(error: tungstenite::Error) -> Self {
        Self::Transport(Box::new(error))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
