//! Top-level client

use crate::error::ClientResult;
use cord_common::ClientConfig;
use cord_core::Dispatcher;
use cord_gateway::{Gateway, GatewayConfig, ShardEvent};
use cord_http::{HttpClient, HttpConfig};
use std::sync::Arc;

/// One HTTP client plus one gateway, sharing the same token
#[derive(Clone, Debug)]
pub struct Client {
    http: Arc<HttpClient>,
    gateway: Gateway,
}

impl Client {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let http = HttpClient::new(HttpConfig {
            api_base: config.api_base.clone(),
            token: Some(config.token.clone()),
            max_retries: config.http_max_retries,
            trust_local_time: config.trust_local_time,
            ..HttpConfig::default()
        })?;

        let mut gateway = GatewayConfig::new(config.token.clone());
        gateway.intents = config.intents;
        gateway.shard_count = config.shard_count;
        gateway.gateway_url.clone_from(&config.gateway_url);

        Ok(Self::from_parts(Arc::new(http), gateway))
    }

    /// Build from an existing HTTP client and explicit gateway settings
    pub fn from_parts(http: Arc<HttpClient>, gateway: GatewayConfig) -> Self {
        let gateway = Gateway::new(Arc::clone(&http), gateway);
        Self { http, gateway }
    }

    pub fn http(&self) -> &Arc<HttpClient> {
        &self.http
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Dispatch events from every shard, keyed by event name
    pub fn events(&self) -> &Dispatcher<String, ShardEvent> {
        self.gateway.events()
    }

    /// Connect every shard and block until [`Client::close`] or a fatal error
    ///
    /// A fatal error closes the HTTP client and every shard before it is
    /// returned.
    pub async fn run(&self) -> ClientResult<()> {
        tracing::info!("Starting client");

        let result = match self.gateway.connect().await {
            Ok(()) => self.gateway.run().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::info!("Client stopped");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Shutting down after fatal error");
                self.close();
                Err(e.into())
            }
        }
    }

    /// Close the gateway and the HTTP client. Idempotent.
    pub fn close(&self) {
        self.gateway.close();
        self.http.close();
    }
}
