//! Gateway configuration

use crate::protocol::IdentifyProperties;
use crate::shard::ShardConfig;
use std::fmt;
use std::time::Duration;

/// Used when neither an override nor a discovered URL is available
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg";

/// Settings shared by every shard of a [`crate::Gateway`]
#[derive(Clone)]
pub struct GatewayConfig {
    pub token: String,
    pub intents: u64,
    /// Pinned shard count; `None` adopts the recommended count
    pub shard_count: Option<u32>,
    /// Overrides the URL returned by discovery
    pub gateway_url: Option<String>,
    pub api_version: u8,
    pub properties: IdentifyProperties,
    /// One identify per concurrency key per window
    pub identify_window: Duration,
    pub send_limit: u32,
    pub send_period: Duration,
    pub reconnect_delay: Duration,
}

impl GatewayConfig {
    pub fn new(token: impl Into<String>) -> Self {
        let defaults = ShardConfig::new(0, 1, "", "");
        Self {
            token: token.into(),
            intents: 0,
            shard_count: None,
            gateway_url: None,
            api_version: 9,
            properties: IdentifyProperties::default(),
            identify_window: Duration::from_secs(5),
            send_limit: defaults.send_limit,
            send_period: defaults.send_period,
            reconnect_delay: defaults.reconnect_delay,
        }
    }

    /// Append version and compression parameters to `base`
    ///
    /// ```
    /// use cord_gateway::GatewayConfig;
    ///
    /// let config = GatewayConfig::new("token");
    /// assert_eq!(
    ///     config.connection_url("wss://gateway.discord.gg"),
    ///     "wss://gateway.discord.gg/?v=9&encoding=json&compress=zlib-stream"
    /// );
    /// ```
    pub fn connection_url(&self, base: &str) -> String {
        let mut url = base.trim_end_matches('/').to_string();
        let has_query = url.contains('?');
        let has_path = url
            .split_once("://")
            .map_or(url.as_str(), |(_, rest)| rest)
            .contains('/');
        if !has_path && !has_query {
            url.push('/');
        }

        let separator = if has_query { '&' } else { '?' };
        format!(
            "{url}{separator}v={}&encoding=json&compress=zlib-stream",
            self.api_version
        )
    }

    /// Per-shard config for shard `shard_id` of `shard_count`
    pub(crate) fn shard(
        &self,
        shard_id: u32,
        shard_count: u32,
        url: &str,
        generation: u64,
    ) -> ShardConfig {
        ShardConfig {
            shard_id,
            shard_count,
            url: url.to_string(),
            token: self.token.clone(),
            intents: self.intents,
            properties: self.properties.clone(),
            generation,
            send_limit: self.send_limit,
            send_period: self.send_period,
            reconnect_delay: self.reconnect_delay,
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("token", &"[redacted]")
            .field("intents", &self.intents)
            .field("shard_count", &self.shard_count)
            .field("gateway_url", &self.gateway_url)
            .field("api_version", &self.api_version)
            .field("identify_window", &self.identify_window)
            .finish()
    }
}
