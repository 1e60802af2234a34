//! Integration tests for the chat REST API.
//!
//! Each test spins up an Axum server on a random port with the in-memory
//! store and the echo model, then drives the submit / poll / cancel
//! contract over real HTTP.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;

use zynapse::chat::{AppState, ChatTask, chat_routes};
use zynapse::config::{DispatchConfig, StoreConfig};
use zynapse::llm::EchoModel;
use zynapse::store::{InMemoryBackend, TaskStateStore};
use zynapse::worker::LocalDispatcher;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Start an Axum server on a random port, return its base URL.
async fn start_server(model_delay: Duration) -> String {
    let store = Arc::new(TaskStateStore::new(
        Arc::new(InMemoryBackend::new()),
        StoreConfig::default(),
    ));
    let body = Arc::new(ChatTask::new(
        Arc::new(EchoModel::with_delay(model_delay)),
        "Be brief.",
    ));
    let dispatcher = LocalDispatcher::spawn(&DispatchConfig::default(), Arc::clone(&store), body);
    let app = chat_routes(AppState { store, dispatcher });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{}", port)
}

async fn submit(client: &reqwest::Client, base: &str, query: &str) -> String {
    let response = client
        .post(format!("{}/chat", base))
        .json(&serde_json::json!({"query": query, "page_id": "page-1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    body["request_id"].as_str().expect("missing request_id").to_string()
}

/// Poll until the record reaches a terminal status, return the last record.
async fn poll_until_finished(client: &reqwest::Client, base: &str, id: &str) -> Value {
    loop {
        let response = client
            .get(format!("{}/chat", base))
            .query(&[("request_id", id)])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let record: Value = response.json().await.unwrap();
        let current = &record["current"];
        if current["type"] == "status"
            && matches!(current["content"].as_str(), Some("done" | "error" | "cancelled"))
        {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn chat_turn_streams_to_done() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server(Duration::ZERO).await;
        let client = reqwest::Client::new();

        let id = submit(&client, &base, "how do sliding ttls work").await;
        let record = poll_until_finished(&client, &base, &id).await;

        assert_eq!(record["current"], serde_json::json!({"type": "status", "content": "done"}));
        let updates = record["updates"].as_array().unwrap();
        assert_eq!(updates[0]["content"], "queued");
        assert_eq!(updates[1]["content"], "started");
        // Message chunks collapse into one entry holding the full reply.
        assert_eq!(updates.len(), 3);
        assert_eq!(
            updates[2],
            serde_json::json!({"type": "message", "content": "how do sliding ttls work"})
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn poll_reports_remaining_ttl() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server(Duration::ZERO).await;
        let client = reqwest::Client::new();
        let id = submit(&client, &base, "hello").await;

        let response = client
            .get(format!("{}/chat", base))
            .query(&[("request_id", id.as_str())])
            .send()
            .await
            .unwrap();
        let ttl_ms: u64 = response.headers()["x-record-ttl-ms"]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(ttl_ms > 0 && ttl_ms <= 300_000);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_request_is_404() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server(Duration::ZERO).await;
        let client = reqwest::Client::new();

        let response = client
            .get(format!("{}/chat?request_id=does-not-exist", base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
        assert_eq!(response.text().await.unwrap(), "Record not found");

        let response = client
            .delete(format!("{}/chat?request_id=does-not-exist", base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn cancelled_turn_stops_early() {
    timeout(TEST_TIMEOUT, async {
        // Slow model so the cancellation lands mid-reply.
        let base = start_server(Duration::from_millis(100)).await;
        let client = reqwest::Client::new();

        let id = submit(&client, &base, "one two three four five six seven eight").await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let response = client
            .delete(format!("{}/chat", base))
            .query(&[("request_id", id.as_str())])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 202);

        let record = poll_until_finished(&client, &base, &id).await;
        assert_eq!(record["current"]["content"], "cancelled");
        let reply = record["updates"]
            .as_array()
            .unwrap()
            .iter()
            .find(|e| e["type"] == "message")
            .and_then(|e| e["content"].as_str())
            .unwrap_or_default()
            .to_string();
        assert_ne!(reply, "one two three four five six seven eight");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server(Duration::ZERO).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/chat", base))
            .json(&serde_json::json!({"query": "no page"}))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server(Duration::ZERO).await;
        let body: Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    })
    .await
    .expect("test timed out");
}
