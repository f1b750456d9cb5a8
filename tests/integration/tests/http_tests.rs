//! HTTP client against a scripted REST API
//!
//! Run with: cargo test -p integration-tests --test http_tests

use cord_http::{HttpClient, HttpConfig, HttpError, Route};
use integration_tests::{MockApi, MockResponse};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn client(api: &MockApi, max_retries: u32) -> HttpClient {
    HttpClient::new(HttpConfig {
        api_base: api.base_url(),
        token: Some("test-token".to_string()),
        max_retries,
        trust_local_time: false,
        server_error_backoff: Duration::from_millis(10),
        ..HttpConfig::default()
    })
    .expect("client")
}

// ============================================================================
// Retry budget
// ============================================================================

#[tokio::test]
async fn test_retries_exhausted_after_budget() {
    let api = MockApi::start().await.unwrap();
    api.always("/channels/1/messages", MockResponse::rate_limited(0.01, false));
    let http = client(&api, 3);

    let err = http
        .request(&Route::get("/channels/{channel_id}/messages").channel(1), None)
        .await
        .unwrap_err();

    assert!(matches!(err, HttpError::RateLimitExhausted { attempts: 3 }));
    assert_eq!(api.hits("/channels/1/messages"), 3);
}

#[tokio::test]
async fn test_bounce_then_success() {
    let api = MockApi::start().await.unwrap();
    api.script(
        "/users/@me",
        [
            MockResponse::rate_limited(0.05, false),
            MockResponse::ok(json!({ "id": "42" })),
        ],
    );
    let http = client(&api, 5);

    let started = Instant::now();
    let user: serde_json::Value = http
        .request_json(&Route::get("/users/@me"), None)
        .await
        .unwrap();

    assert_eq!(user["id"], "42");
    assert_eq!(api.hits("/users/@me"), 2);
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn test_server_error_retried() {
    let api = MockApi::start().await.unwrap();
    api.script(
        "/gateway/bot",
        [
            MockResponse::error(503, 0, "Service Unavailable"),
            MockResponse::error(502, 0, "Bad Gateway"),
        ],
    );
    api.gateway_bot("wss://gateway.example", 3, 16);
    let http = client(&api, 5);

    let bot = http.get_gateway_bot().await.unwrap();

    assert_eq!(bot.shards, 3);
    assert_eq!(bot.session_start_limit.max_concurrency, 16);
    assert_eq!(api.hits("/gateway/bot"), 3);
}

// ============================================================================
// Failures surfaced immediately
// ============================================================================

#[tokio::test]
async fn test_edge_ban_without_via_header() {
    let api = MockApi::start().await.unwrap();
    api.always("/guilds/9", MockResponse::edge_ban());
    let http = client(&api, 5);

    let err = http
        .request(&Route::get("/guilds/{guild_id}").guild(9), None)
        .await
        .unwrap_err();

    assert!(matches!(err, HttpError::NetworkEdgeBan));
    assert_eq!(api.hits("/guilds/9"), 1);
}

#[tokio::test]
async fn test_client_error_carries_code_and_message() {
    let api = MockApi::start().await.unwrap();
    api.always("/channels/7", MockResponse::error(404, 10003, "Unknown Channel"));
    let http = client(&api, 5);

    let err = http
        .request(&Route::get("/channels/{channel_id}").channel(7), None)
        .await
        .unwrap_err();

    match err {
        HttpError::Http {
            status,
            code,
            message,
        } => {
            assert_eq!(status, 404);
            assert_eq!(code, 10003);
            assert_eq!(message, "Unknown Channel");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(api.hits("/channels/7"), 1);
}

#[tokio::test]
async fn test_closed_client_sends_nothing() {
    let api = MockApi::start().await.unwrap();
    let http = client(&api, 5);
    http.close();

    let err = http.request(&Route::get("/users/@me"), None).await.unwrap_err();

    assert!(matches!(err, HttpError::Closed));
    assert_eq!(api.hits("/users/@me"), 0);
}

// ============================================================================
// Rate-limit state
// ============================================================================

#[tokio::test]
async fn test_global_bounce_holds_every_route() {
    let api = MockApi::start().await.unwrap();
    api.script(
        "/channels/1/messages",
        [MockResponse::rate_limited(0.3, true)],
    );
    let http = Arc::new(client(&api, 5));

    let first = {
        let http = Arc::clone(&http);
        tokio::spawn(async move {
            http.request(&Route::get("/channels/{channel_id}/messages").channel(1), None)
                .await
                .map(|_| ())
        })
    };

    // Wait for the bounce to close the gate
    let deadline = Instant::now() + Duration::from_secs(5);
    while !http.global_gate().is_closed() {
        assert!(Instant::now() < deadline, "global gate never closed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let started = Instant::now();
    http.request(&Route::get("/users/@me"), None).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(100));

    first.await.unwrap().unwrap();
    assert_eq!(api.hits("/channels/1/messages"), 2);
    assert!(!http.global_gate().is_closed());
}

#[tokio::test]
async fn test_bucket_learns_from_headers() {
    let api = MockApi::start().await.unwrap();
    api.always(
        "/channels/5/messages",
        MockResponse::ok(json!([])).with_bucket(5, 4, 1.0),
    );
    let http = client(&api, 5);
    let route = Route::get("/channels/{channel_id}/messages").channel(5);

    http.request(&route, None).await.unwrap();

    let bucket = http.bucket(route.bucket_key());
    assert_eq!(bucket.limit(), Some(5));
    assert_eq!(bucket.remaining(), Some(4));
    assert_eq!(bucket.reserved(), 0);
}

#[tokio::test]
async fn test_authorization_header_sent() {
    let api = MockApi::start().await.unwrap();
    let http = client(&api, 5);

    http.request(&Route::get("/users/@me"), None).await.unwrap();

    assert_eq!(
        api.authorizations(),
        vec![Some("Bot test-token".to_string())]
    );
}
