//! Client configuration
//!
//! Loads configuration from environment variables, reading a `.env` file first
//! when one is present.

use std::env;

/// Deployment environment, selects the logging preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Top-level client configuration
#[derive(Clone)]
pub struct ClientConfig {
    /// Bot token sent on Identify, Resume and as the REST `Authorization` header
    pub token: String,
    /// Gateway intents bitfield
    pub intents: u64,
    /// Pinned shard count; `None` adopts the server recommendation
    pub shard_count: Option<u32>,
    /// REST API base URL, without trailing slash
    pub api_base: String,
    /// Overrides the websocket URL returned by discovery
    pub gateway_url: Option<String>,
    /// Attempts per REST request before giving up
    pub http_max_retries: u32,
    /// Derive bucket resets from the absolute reset timestamp and the local clock
    pub trust_local_time: bool,
    pub env: Environment,
}

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v9";

fn default_http_max_retries() -> u32 {
    5
}

impl ClientConfig {
    /// Minimal configuration with every optional setting at its default
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            intents: 0,
            shard_count: None,
            api_base: DEFAULT_API_BASE.to_string(),
            gateway_url: None,
            http_max_retries: default_http_max_retries(),
            trust_local_time: true,
            env: Environment::default(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `BOT_TOKEN` is missing or a numeric variable does not parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let token = lookup("BOT_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::MissingVar("BOT_TOKEN"))?;

        let mut config = Self::new(token.trim());

        if let Some(intents) = parse_var(&lookup, "INTENTS")? {
            config.intents = intents;
        }
        config.shard_count = parse_var(&lookup, "SHARD_COUNT")?;
        if config.shard_count == Some(0) {
            return Err(ConfigError::InvalidValue(
                "SHARD_COUNT",
                "must be at least 1".to_string(),
            ));
        }
        if let Some(api_base) = lookup("API_BASE") {
            config.api_base = api_base.trim_end_matches('/').to_string();
        }
        config.gateway_url = lookup("GATEWAY_URL");
        if let Some(retries) = parse_var(&lookup, "HTTP_MAX_RETRIES")? {
            config.http_max_retries = retries;
        }
        if let Some(trust) = parse_var(&lookup, "TRUST_LOCAL_TIME")? {
            config.trust_local_time = trust;
        }
        config.env = lookup("APP_ENV")
            .as_deref()
            .and_then(Environment::parse)
            .unwrap_or_default();

        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("token", &"<redacted>")
            .field("intents", &self.intents)
            .field("shard_count", &self.shard_count)
            .field("api_base", &self.api_base)
            .field("gateway_url", &self.gateway_url)
            .field("http_max_retries", &self.http_max_retries)
            .field("trust_local_time", &self.trust_local_time)
            .field("env", &self.env)
            .finish()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
