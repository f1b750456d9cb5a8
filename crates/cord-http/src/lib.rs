//! # cord-http
//!
//! REST client for the gateway service. Every request passes a global gate
//! and a per-route bucket whose accounting is driven by the server's
//! rate-limit headers.

pub mod bucket;
pub mod client;
pub mod error;
pub mod headers;
pub mod models;
pub mod route;

pub use bucket::{Bucket, BucketGuard};
pub use client::{HttpClient, HttpConfig};
pub use error::{HttpError, HttpResult};
pub use headers::RateLimitInfo;
pub use models::{GatewayBot, SessionStartLimit};
pub use route::{BucketKey, Route};

pub use reqwest::Method;
