//! Gateway orchestration and client shutdown
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use cord_client::{Client, ClientError};
use cord_gateway::{Gateway, GatewayConfig, GatewayError, GatewayMessage, OpCode, ShardState};
use cord_http::{HttpClient, HttpConfig};
use integration_tests::{frames, within, MockApi, MockGateway};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn http(api: &MockApi) -> Arc<HttpClient> {
    Arc::new(
        HttpClient::new(HttpConfig {
            api_base: api.base_url(),
            token: Some("gateway-token".to_string()),
            ..HttpConfig::default()
        })
        .expect("client"),
    )
}

fn config(identify_window: Duration) -> GatewayConfig {
    let mut config = GatewayConfig::new("gateway-token");
    config.identify_window = identify_window;
    config.reconnect_delay = Duration::from_millis(50);
    config
}

fn ready(session_id: &str) -> GatewayMessage {
    frames::dispatch("READY", 1, json!({ "session_id": session_id }))
}

// ============================================================================
// Discovery and identify pacing
// ============================================================================

#[tokio::test]
async fn test_shared_concurrency_key_spaces_identifies() {
    let api = MockApi::start().await.unwrap();
    let mut mock = MockGateway::start(45_000).await.unwrap();
    api.gateway_bot(&mock.url(), 2, 1);

    let gateway = Gateway::new(http(&api), config(Duration::from_millis(500)));
    gateway.connect().await.unwrap();

    assert_eq!(gateway.shard_count(), Some(2));
    assert_eq!(gateway.max_concurrency(), Some(1));
    assert_eq!(gateway.shards().len(), 2);

    let mut a = mock.next_connection().await;
    let mut b = mock.next_connection().await;
    let ((at_a, identify_a), (at_b, identify_b)) =
        tokio::join!(a.recv_op(OpCode::Identify), b.recv_op(OpCode::Identify));

    let shards: HashSet<[u32; 2]> = [identify_a, identify_b]
        .iter()
        .map(|m| frames::identify_payload(m).unwrap().shard)
        .collect();
    assert_eq!(shards, HashSet::from([[0, 2], [1, 2]]));

    let gap = if at_a > at_b { at_a - at_b } else { at_b - at_a };
    assert!(gap >= Duration::from_millis(400), "identifies only {gap:?} apart");

    gateway.close();
}

#[tokio::test]
async fn test_distinct_concurrency_keys_identify_together() {
    let api = MockApi::start().await.unwrap();
    let mut mock = MockGateway::start(45_000).await.unwrap();
    api.gateway_bot(&mock.url(), 2, 2);

    let gateway = Gateway::new(http(&api), config(Duration::from_secs(5)));
    gateway.connect().await.unwrap();

    let mut a = mock.next_connection().await;
    let mut b = mock.next_connection().await;
    let ((at_a, _), (at_b, _)) =
        tokio::join!(a.recv_op(OpCode::Identify), b.recv_op(OpCode::Identify));

    let gap = if at_a > at_b { at_a - at_b } else { at_b - at_a };
    assert!(gap < Duration::from_secs(2), "identifies {gap:?} apart");

    gateway.close();
}

#[tokio::test]
async fn test_pinned_count_overrides_recommendation() {
    let api = MockApi::start().await.unwrap();
    let mut mock = MockGateway::start(45_000).await.unwrap();
    api.gateway_bot(&mock.url(), 1, 16);

    let mut config = config(Duration::from_millis(10));
    config.shard_count = Some(3);
    let gateway = Gateway::new(http(&api), config);
    gateway.connect().await.unwrap();

    assert_eq!(gateway.shard_count(), Some(3));
    let mut seen = HashSet::new();
    for _ in 0..3 {
        let mut connection = mock.next_connection().await;
        let (_, identify) = connection.recv_op(OpCode::Identify).await;
        seen.insert(frames::identify_payload(&identify).unwrap().shard);
    }
    assert_eq!(seen, HashSet::from([[0, 3], [1, 3], [2, 3]]));

    gateway.close();
}

#[tokio::test]
async fn test_configured_url_overrides_discovery() {
    let api = MockApi::start().await.unwrap();
    let mut mock = MockGateway::start(45_000).await.unwrap();
    api.gateway_bot("ws://127.0.0.1:1", 1, 1);

    let mut config = config(Duration::from_millis(10));
    config.gateway_url = Some(mock.url());
    let gateway = Gateway::new(http(&api), config);
    gateway.connect().await.unwrap();

    let mut connection = mock.next_connection().await;
    connection.recv_op(OpCode::Identify).await;
    assert!(gateway.url().unwrap().starts_with(&mock.url()));

    gateway.close();
}

#[tokio::test]
async fn test_repeated_connect_keeps_first_shard_set() {
    let api = MockApi::start().await.unwrap();
    let mut mock = MockGateway::start(45_000).await.unwrap();
    api.gateway_bot(&mock.url(), 1, 1);

    let gateway = Gateway::new(http(&api), config(Duration::from_millis(10)));
    gateway.connect().await.unwrap();
    let mut connection = mock.next_connection().await;
    connection.recv_op(OpCode::Identify).await;
    connection.send(ready("only"));
    let shard = gateway.shard(0).unwrap();
    assert!(within("READY", shard.wait_for_state(ShardState::Connected)).await);

    gateway.connect().await.unwrap();

    assert_eq!(api.hits("/gateway/bot"), 1);
    assert_eq!(gateway.shards().len(), 1);
    assert_eq!(gateway.shard(0).unwrap().session_id().as_deref(), Some("only"));
    assert_eq!(shard.state(), ShardState::Connected);

    gateway.close();
    assert_eq!(connection.recv_close().await, Some(1000));
}

// ============================================================================
// Rescale
// ============================================================================

#[tokio::test]
async fn test_rescale_replaces_shard_set() {
    let api = MockApi::start().await.unwrap();
    let mut mock = MockGateway::start(45_000).await.unwrap();
    api.gateway_bot(&mock.url(), 1, 1);

    let gateway = Gateway::new(http(&api), config(Duration::from_millis(20)));
    gateway.connect().await.unwrap();

    let mut old = mock.next_connection().await;
    old.recv_op(OpCode::Identify).await;
    old.send(ready("old"));
    let old_shard = gateway.shard(0).unwrap();
    assert!(within("old READY", old_shard.wait_for_state(ShardState::Connected)).await);

    api.gateway_bot(&mock.url(), 2, 1);
    let rescale = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.rescale().await })
    };

    for n in 0..2 {
        let mut connection = mock.next_connection().await;
        connection.recv_op(OpCode::Identify).await;
        assert!(gateway.is_recreating());
        connection.send(ready(&format!("new-{n}")));
        // Keep the connection open until the swap
        tokio::spawn(async move {
            connection.recv_close().await;
        });
    }

    within("rescale", rescale).await.unwrap().unwrap();

    assert!(!gateway.is_recreating());
    assert_eq!(gateway.shard_count(), Some(2));
    assert_eq!(gateway.shards().len(), 2);
    assert!(gateway.shards().iter().all(|s| s.generation() == 1));
    assert_eq!(old_shard.state(), ShardState::Closed);
    assert_eq!(old.recv_close().await, Some(1000));

    gateway.close();
}

#[tokio::test]
async fn test_pinned_rescale_stops_run() {
    let api = MockApi::start().await.unwrap();
    let mock = MockGateway::start(45_000).await.unwrap();
    api.gateway_bot(&mock.url(), 2, 1);

    let mut config = config(Duration::from_millis(10));
    config.shard_count = Some(1);
    let gateway = Gateway::new(http(&api), config);
    gateway.connect().await.unwrap();

    assert!(matches!(
        gateway.rescale().await,
        Err(GatewayError::NotEnoughShards)
    ));
    assert!(matches!(
        within("run", gateway.run()).await,
        Err(GatewayError::NotEnoughShards)
    ));

    gateway.close();
}

// ============================================================================
// Client
// ============================================================================

#[tokio::test]
async fn test_fatal_close_shuts_client_down() {
    let api = MockApi::start().await.unwrap();
    let mut mock = MockGateway::start(45_000).await.unwrap();
    api.gateway_bot(&mock.url(), 1, 1);

    let http = http(&api);
    let client = Client::from_parts(Arc::clone(&http), config(Duration::from_millis(10)));
    let run = {
        let client = client.clone();
        tokio::spawn(async move { client.run().await })
    };

    let mut connection = mock.next_connection().await;
    connection.recv_op(OpCode::Identify).await;
    connection.close(4004);

    let result = within("client run", run).await.unwrap();
    assert!(matches!(
        result,
        Err(ClientError::Gateway(GatewayError::AuthenticationFailed))
    ));
    assert!(http.is_closed());
    assert!(client.gateway().is_closed());
    assert!(client
        .gateway()
        .shards()
        .iter()
        .all(|s| s.state() == ShardState::Closed));
}

#[tokio::test]
async fn test_client_close_ends_run() {
    let api = MockApi::start().await.unwrap();
    let mut mock = MockGateway::start(45_000).await.unwrap();
    api.gateway_bot(&mock.url(), 1, 1);

    let client = Client::from_parts(http(&api), config(Duration::from_millis(10)));
    let run = {
        let client = client.clone();
        tokio::spawn(async move { client.run().await })
    };

    let mut connection = mock.next_connection().await;
    connection.recv_op(OpCode::Identify).await;

    client.close();
    assert!(within("client run", run).await.unwrap().is_ok());
    assert_eq!(connection.recv_close().await, Some(1000));
}

#[tokio::test]
async fn test_discovery_failure_surfaces_from_run() {
    let api = MockApi::start().await.unwrap();
    api.always(
        "/gateway/bot",
        integration_tests::MockResponse::error(401, 0, "401: Unauthorized"),
    );

    let client = Client::from_parts(http(&api), config(Duration::from_millis(10)));
    let result = client.run().await;

    assert!(matches!(
        result,
        Err(ClientError::Gateway(GatewayError::Http(_)))
    ));
    assert!(client.http().is_closed());
}
