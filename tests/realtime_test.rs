//! End-to-end tests: real server on a random port, raw sockets and the client.

use agenthq_realtime::client::{ClientConfig, ConnectionState, RealtimeClient};
use agenthq_realtime::config::Config;
use agenthq_realtime::models::{DiagnosticsResponse, Post, PublishResponse, Subscribed};
use agenthq_realtime::services::SessionClaims;
use agenthq_realtime::state::AppState;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

const JWT_SECRET: &str = "integration-secret";
const AGENT_KEY: &str = "ahq_integration";

/// Start the server on a random port and return its address.
async fn start_test_server() -> SocketAddr {
    let config = Config {
        jwt_secret: Some(JWT_SECRET.to_string()),
        api_keys: Some(format!("{AGENT_KEY}=agent-1@org-1")),
        ..Config::default()
    };
    let app = agenthq_realtime::routes::build_router(AppState::new(config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn user_token(user_id: &str, org_id: &str) -> String {
    let claims = SessionClaims {
        sub: user_id.to_string(),
        org_id: org_id.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

async fn diagnostics(addr: SocketAddr) -> DiagnosticsResponse {
    reqwest::Client::new()
        .get(format!("http://{addr}/api/v1/diagnostics"))
        .bearer_auth(AGENT_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

fn sample_post(channel_id: &str) -> serde_json::Value {
    json!({
        "id": "post-1",
        "org_id": "org-1",
        "channel_id": channel_id,
        "author_id": "agent-1",
        "author_type": "agent",
        "type": "update",
        "content": "build is green",
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": "2026-01-01T00:00:00Z"
    })
}

#[tokio::test]
async fn test_health_is_public() {
    let addr = start_test_server().await;
    let response = reqwest::get(format!("http://{addr}/api/health")).await.unwrap();
    assert_eq!(response.status(), 200);

    let response = reqwest::get(format!("http://{addr}/api/v1/diagnostics")).await.unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_ws_missing_token_closes_4001() {
    let addr = start_test_server().await;
    let (ws_stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("WebSocket should upgrade before authentication");
    let (_write, mut read) = ws_stream.split();

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected close message within timeout");
    match msg {
        Some(Ok(Message::Close(Some(frame)))) => assert_eq!(u16::from(frame.code), 4001),
        other => panic!("Expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ws_invalid_token_closes_4001() {
    let addr = start_test_server().await;
    let (ws_stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token=garbage"))
        .await
        .unwrap();
    let (_write, mut read) = ws_stream.split();

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next()).await.unwrap();
    assert!(matches!(msg, Some(Ok(Message::Close(Some(frame)))) if u16::from(frame.code) == 4001));
}

#[tokio::test]
async fn test_ws_subscribe_ack_and_cleanup() {
    let addr = start_test_server().await;
    let token = user_token("user-1", "org-1");
    let (ws_stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token={token}"))
        .await
        .unwrap();
    let (mut write, mut read) = ws_stream.split();

    write
        .send(Message::Text(json!({"event": "subscribe", "data": {"channelId": "general"}}).to_string().into()))
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next()).await.unwrap();
    let text = match msg {
        Some(Ok(Message::Text(text))) => text,
        other => panic!("Expected ack, got {other:?}"),
    };
    let ack: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(ack, json!({"event": "subscribed", "data": {"channelId": "general"}}));

    let stats = diagnostics(addr).await;
    assert_eq!(stats.n_user_conn, 1);
    assert_eq!(stats.n_channels, 1);
    assert_eq!(stats.n_subscriptions, 1);

    write.send(Message::Close(None)).await.unwrap();
    drop(write);
    drop(read);

    // Cleanup runs on the server after the close is processed
    let cleaned = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let stats = diagnostics(addr).await;
            if stats.n_user_conn == 0 && stats.n_subscriptions == 0 {
                break stats;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("connection should be cleaned up");
    assert_eq!(cleaned.n_channels, 0);
}

#[tokio::test]
async fn test_ws_heartbeat_ack() {
    let addr = start_test_server().await;
    let token = user_token("user-1", "org-1");
    let (ws_stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token={token}"))
        .await
        .unwrap();
    let (mut write, mut read) = ws_stream.split();

    write
        .send(Message::Text(json!({"event": "heartbeat", "data": {"timestamp": 1}}).to_string().into()))
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next()).await.unwrap();
    let text = match msg {
        Some(Ok(Message::Text(text))) => text,
        other => panic!("Expected heartbeat ack, got {other:?}"),
    };
    let ack: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(ack["event"], "heartbeat_ack");
    assert!(ack["data"]["timestamp"].is_string());
}

#[tokio::test]
async fn test_client_receives_published_post() {
    let addr = start_test_server().await;
    let client = RealtimeClient::new(
        ClientConfig::new(format!("ws://{addr}/ws")).with_static_token(user_token("user-1", "org-1")),
    );

    let acks = Arc::new(Mutex::new(Vec::new()));
    let posts = Arc::new(Mutex::new(Vec::new()));
    let _ack_listener = {
        let acks = acks.clone();
        client.on::<Subscribed>(move |ack| acks.lock().unwrap().push(ack.channel_id.clone()))
    };
    let _post_listener = {
        let posts = posts.clone();
        client.on::<Post>(move |post| posts.lock().unwrap().push(post.content.clone()))
    };

    client.connect();
    let connected = tokio::time::timeout(
        Duration::from_secs(5),
        client.wait_for_state(ConnectionState::Connected),
    )
    .await;
    assert_eq!(connected, Ok(true));

    client.subscribe("general");
    tokio::time::timeout(Duration::from_secs(2), async {
        while acks.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscribe should be acknowledged");

    let response: PublishResponse = reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/orgs/org-1/channels/general/events"))
        .bearer_auth(AGENT_KEY)
        .json(&json!({"event": "post:new", "data": sample_post("general")}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response.event, "post:new");
    assert_eq!(response.delivered, 1);

    tokio::time::timeout(Duration::from_secs(2), async {
        while posts.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("post should be delivered");
    assert_eq!(*posts.lock().unwrap(), vec!["build is green".to_string()]);

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // Nothing reconnects after an explicit disconnect
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(diagnostics(addr).await.n_user_conn, 0);
}

#[tokio::test]
async fn test_publish_rejects_other_org() {
    let addr = start_test_server().await;
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/orgs/org-2/events"))
        .bearer_auth(AGENT_KEY)
        .json(&json!({"event": "agent:status", "data": {"agentId": "agent-1", "status": "idle"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_org_broadcast_skips_other_orgs() {
    let addr = start_test_server().await;
    let (own, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token={}", user_token("u1", "org-1")))
        .await
        .unwrap();
    let (other, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token={}", user_token("u2", "org-2")))
        .await
        .unwrap();
    let (_own_write, mut own_read) = own.split();
    let (_other_write, mut other_read) = other.split();

    // Both connections are registered before the broadcast
    tokio::time::timeout(Duration::from_secs(2), async {
        while diagnostics(addr).await.n_user_conn < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let response: PublishResponse = reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/orgs/org-1/events"))
        .bearer_auth(AGENT_KEY)
        .json(&json!({"event": "agent:status", "data": {"agentId": "agent-1", "status": "working"}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response.delivered, 1);

    let msg = tokio::time::timeout(Duration::from_secs(2), own_read.next()).await.unwrap();
    assert!(matches!(msg, Some(Ok(Message::Text(text))) if text.contains("agent:status")));

    let result = tokio::time::timeout(Duration::from_millis(300), other_read.next()).await;
    assert!(result.is_err(), "Other org must not receive the event");
}

#[tokio::test]
async fn test_client_without_credential_errors() {
    let addr = start_test_server().await;
    let client = RealtimeClient::new(ClientConfig::new(format!("ws://{addr}/ws")).polling_fallback(false));
    client.connect();
    let reached = tokio::time::timeout(Duration::from_secs(2), client.wait_for_state(ConnectionState::Error)).await;
    assert_eq!(reached, Ok(true));
    assert_eq!(diagnostics(addr).await.n_conn, 0);
}
