//! Rate-limit response headers

use reqwest::header::HeaderMap;
use std::time::Duration;

pub const LIMIT: &str = "x-ratelimit-limit";
pub const REMAINING: &str = "x-ratelimit-remaining";
pub const RESET: &str = "x-ratelimit-reset";
pub const RESET_AFTER: &str = "x-ratelimit-reset-after";

/// Server-reported state of a bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    /// Time until the window resets
    pub reset_after: Duration,
}

impl RateLimitInfo {
    /// Parse rate-limit headers; `None` when any required header is missing
    ///
    /// With `trust_local_time` the reset delay is the absolute reset timestamp
    /// minus the local clock, otherwise the server's relative value is used.
    pub fn from_headers(headers: &HeaderMap, trust_local_time: bool) -> Option<Self> {
        let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        Self::parse(headers, trust_local_time, now)
    }

    fn parse(headers: &HeaderMap, trust_local_time: bool, now: f64) -> Option<Self> {
        let limit = header(headers, LIMIT)?;
        let remaining = header(headers, REMAINING)?;
        let reset_after: f64 = if trust_local_time {
            header::<f64>(headers, RESET)? - now
        } else {
            header(headers, RESET_AFTER)?
        };

        Some(Self {
            limit,
            remaining,
            // Clock skew can push the reset into the past
            reset_after: Duration::try_from_secs_f64(reset_after.max(0.0)).unwrap_or_default(),
        })
    }
}

fn header<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
