//! Rate-limited REST client

use crate::bucket::Bucket;
use crate::error::{HttpError, HttpResult};
use crate::headers::RateLimitInfo;
use crate::models::{ApiErrorBody, GatewayBot, RateLimitBounce};
use crate::route::{BucketKey, Route};
use cord_core::GlobalGate;
use dashmap::DashMap;
use reqwest::header::{AUTHORIZATION, VIA};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// HTTP client settings
#[derive(Clone)]
pub struct HttpConfig {
    /// Base URL every route path is appended to
    pub api_base: String,
    /// Sent as `Authorization: Bot <token>` when set
    pub token: Option<String>,
    /// Attempts per request before [`HttpError::RateLimitExhausted`]
    pub max_retries: u32,
    /// Compute bucket resets from the absolute reset header and the local clock
    pub trust_local_time: bool,
    pub user_agent: String,
    /// Base delay before retrying a 502/503/504, multiplied by the attempt number
    pub server_error_backoff: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            api_base: "https://discord.com/api/v9".to_string(),
            token: None,
            max_retries: 5,
            trust_local_time: true,
            user_agent: format!("DiscordBot (cord, {})", env!("CARGO_PKG_VERSION")),
            server_error_backoff: Duration::from_millis(500),
        }
    }
}

impl std::fmt::Debug for HttpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConfig")
            .field("api_base", &self.api_base)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("max_retries", &self.max_retries)
            .field("trust_local_time", &self.trust_local_time)
            .finish()
    }
}

/// REST client honoring per-route buckets and the global rate limit
///
/// Buckets are created on first use and live as long as the client.
pub struct HttpClient {
    http: reqwest::Client,
    config: HttpConfig,
    authorization: Option<String>,
    global: GlobalGate,
    webhook_global: GlobalGate,
    buckets: DashMap<BucketKey, Bucket>,
    closed: AtomicBool,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> HttpResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            authorization: config.token.as_ref().map(|token| format!("Bot {token}")),
            config,
            global: GlobalGate::new(),
            webhook_global: GlobalGate::new(),
            buckets: DashMap::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Gate shared by every non-webhook route
    pub fn global_gate(&self) -> &GlobalGate {
        &self.global
    }

    pub fn webhook_global_gate(&self) -> &GlobalGate {
        &self.webhook_global
    }

    /// Bucket for `key`, created on first use
    pub fn bucket(&self, key: &BucketKey) -> Bucket {
        if let Some(bucket) = self.buckets.get(key) {
            return bucket.clone();
        }
        self.buckets
            .entry(key.clone())
            .or_insert_with(|| Bucket::new(key.clone()))
            .clone()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Send a request, waiting out rate limits
    ///
    /// Passes the route's global gate, then its bucket, on every attempt. A
    /// normal 429 bounce or a 502/503/504 is retried until `max_retries`
    /// attempts have been made. Any other status of 300 or above fails
    /// immediately.
    pub async fn request(&self, route: &Route, body: Option<&Value>) -> HttpResult<Response> {
        if self.is_closed() {
            return Err(HttpError::Closed);
        }

        let gate = if route.uses_webhook_global() {
            &self.webhook_global
        } else {
            &self.global
        };
        let bucket = self.bucket(route.bucket_key());
        let url = format!("{}{}", self.config.api_base, route.path());

        for attempt in 1..=self.config.max_retries {
            gate.enter().await;
            let mut guard = bucket.enter().await;

            let mut builder = self.http.request(route.method().clone(), &url);
            if let Some(authorization) = &self.authorization {
                builder = builder.header(AUTHORIZATION, authorization);
            }
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let response = builder.send().await?;
            let status = response.status();
            tracing::debug!(route = %route, status = status.as_u16(), attempt, "Request completed");

            let info = RateLimitInfo::from_headers(response.headers(), self.config.trust_local_time);
            if let Some(info) = info {
                guard.update(info);
            }
            drop(guard);

            if status.as_u16() < 300 {
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if !response.headers().contains_key(VIA) {
                    tracing::error!(route = %route, "429 without via header, blocked at the network edge");
                    return Err(HttpError::NetworkEdgeBan);
                }

                let bounce: RateLimitBounce = response
                    .json()
                    .await
                    .map_err(|e| HttpError::InvalidResponse(format!("rate limit body: {e}")))?;
                let retry_after = Duration::try_from_secs_f64(bounce.retry_after.max(0.0))
                    .unwrap_or_default();

                tracing::warn!(
                    route = %route,
                    bucket = %route.bucket_key(),
                    global = bounce.global,
                    retry_after_ms = retry_after.as_millis() as u64,
                    attempt,
                    "Rate limited"
                );

                if bounce.global {
                    gate.close(retry_after);
                } else if info.is_none() {
                    // No bucket numbers to wait on
                    tokio::time::sleep(retry_after).await;
                }
                continue;
            }

            if matches!(
                status,
                StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
            ) {
                let backoff = self.config.server_error_backoff * attempt;
                tracing::warn!(
                    route = %route,
                    status = status.as_u16(),
                    backoff_ms = backoff.as_millis() as u64,
                    attempt,
                    "Server error, retrying"
                );
                tokio::time::sleep(backoff).await;
                continue;
            }

            let error: ApiErrorBody = response.json().await.unwrap_or_else(|_| ApiErrorBody {
                code: 0,
                message: status.canonical_reason().unwrap_or_default().to_string(),
            });
            return Err(HttpError::Http {
                status: status.as_u16(),
                code: error.code,
                message: error.message,
            });
        }

        tracing::error!(
            route = %route,
            attempts = self.config.max_retries,
            "Rate limit retries exhausted"
        );
        Err(HttpError::RateLimitExhausted {
            attempts: self.config.max_retries,
        })
    }

    /// Send a request and decode its JSON body
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        route: &Route,
        body: Option<&Value>,
    ) -> HttpResult<T> {
        let response = self.request(route, body).await?;
        response
            .json()
            .await
            .map_err(|e| HttpError::InvalidResponse(format!("{route}: {e}")))
    }

    /// Shard count, identify concurrency and websocket URL
    pub async fn get_gateway_bot(&self) -> HttpResult<GatewayBot> {
        self.request_json(&Route::get("/gateway/bot"), None).await
    }

    /// Refuse further requests
    ///
    /// Requests already past the closed check run to completion.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!("HTTP client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("buckets", &self.buckets.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
