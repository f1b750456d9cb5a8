//! Response bodies the client itself consumes

use serde::Deserialize;

/// `GET /gateway/bot`
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayBot {
    /// Websocket URL; some deployments omit it
    #[serde(default)]
    pub url: Option<String>,
    /// Recommended shard count
    pub shards: u32,
    pub session_start_limit: SessionStartLimit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionStartLimit {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub remaining: u32,
    /// Milliseconds until `remaining` resets
    #[serde(default)]
    pub reset_after: u64,
    /// Identify slots per 5 second window
    pub max_concurrency: u32,
}

/// 429 body
#[derive(Debug, Deserialize)]
pub(crate) struct RateLimitBounce {
    #[serde(default)]
    pub global: bool,
    /// Seconds
    pub retry_after: f64,
}

/// Structured error body of any other failure status
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub code: u64,
    #[serde(default)]
    pub message: String,
}
