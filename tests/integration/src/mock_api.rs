//! Scripted stand-in for the REST API
//!
//! Every path answers from its own queue of [`MockResponse`]s, falling back to
//! a repeating response once the queue is empty and to `200 {}` after that.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One canned response
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

impl MockResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body,
        }
    }

    /// Ordinary 429 bounce, flagged as coming from the application
    pub fn rate_limited(retry_after: f64, global: bool) -> Self {
        Self {
            status: 429,
            headers: vec![("via", "1.1 google".to_string())],
            body: json!({ "message": "You are being rate limited.", "retry_after": retry_after, "global": global }),
        }
    }

    /// 429 produced by the network edge rather than the application
    pub fn edge_ban() -> Self {
        Self {
            status: 429,
            headers: Vec::new(),
            body: json!({ "message": "Access denied", "retry_after": 600.0, "global": true }),
        }
    }

    pub fn error(status: u16, code: u64, message: &str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: json!({ "code": code, "message": message }),
        }
    }

    /// Attach bucket headers with a relative reset
    pub fn with_bucket(mut self, limit: u32, remaining: u32, reset_after: f64) -> Self {
        self.headers.push(("x-ratelimit-limit", limit.to_string()));
        self.headers.push(("x-ratelimit-remaining", remaining.to_string()));
        self.headers.push(("x-ratelimit-reset-after", reset_after.to_string()));
        self
    }
}

#[derive(Default)]
struct Script {
    queue: VecDeque<MockResponse>,
    repeat: Option<MockResponse>,
}

#[derive(Default)]
struct ApiState {
    scripts: Mutex<HashMap<String, Script>>,
    hits: Mutex<HashMap<String, u32>>,
    requests: Mutex<Vec<(Method, String, Option<String>)>>,
}

impl ApiState {
    fn next_response(&self, path: &str) -> MockResponse {
        let mut scripts = self.scripts.lock();
        let Some(script) = scripts.get_mut(path) else {
            return MockResponse::ok(json!({}));
        };
        script
            .queue
            .pop_front()
            .or_else(|| script.repeat.clone())
            .unwrap_or_else(|| MockResponse::ok(json!({})))
    }
}

/// Local REST API server
pub struct MockApi {
    pub addr: SocketAddr,
    state: Arc<ApiState>,
    _handle: JoinHandle<()>,
}

impl MockApi {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(ApiState::default());
        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue responses for `path`, served once each in order
    pub fn script(&self, path: &str, responses: impl IntoIterator<Item = MockResponse>) {
        self.state
            .scripts
            .lock()
            .entry(path.to_string())
            .or_default()
            .queue
            .extend(responses);
    }

    /// Answer `path` with `response` whenever its queue is empty
    pub fn always(&self, path: &str, response: MockResponse) {
        self.state
            .scripts
            .lock()
            .entry(path.to_string())
            .or_default()
            .repeat = Some(response);
    }

    /// Serve discovery parameters on `/gateway/bot`
    pub fn gateway_bot(&self, url: &str, shards: u32, max_concurrency: u32) {
        self.always(
            "/gateway/bot",
            MockResponse::ok(json!({
                "url": url,
                "shards": shards,
                "session_start_limit": {
                    "total": 1000,
                    "remaining": 999,
                    "reset_after": 14_400_000,
                    "max_concurrency": max_concurrency,
                },
            })),
        );
    }

    pub fn hits(&self, path: &str) -> u32 {
        self.state.hits.lock().get(path).copied().unwrap_or(0)
    }

    /// `Authorization` header of every request so far, in arrival order
    pub fn authorizations(&self) -> Vec<Option<String>> {
        self.state
            .requests
            .lock()
            .iter()
            .map(|(_, _, auth)| auth.clone())
            .collect()
    }
}

async fn handle(
    State(state): State<Arc<ApiState>>,
    method: Method,
    uri: Uri,
    headers: axum::http::HeaderMap,
) -> Response {
    let path = uri.path().to_string();
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    *state.hits.lock().entry(path.clone()).or_default() += 1;
    state
        .requests
        .lock()
        .push((method, path.clone(), authorization));

    let response = state.next_response(&path);
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
        .header(header::CONTENT_TYPE, "application/json");
    for (name, value) in response.headers {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(response.body.to_string()))
        .expect("valid mock response")
}
