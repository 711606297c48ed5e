//! HTTP endpoint tests.
//!
//! Drives the axum router directly with `tower::ServiceExt::oneshot`, with
//! forwarding disabled unless a test says otherwise.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use webhook_relay::api::create_router;
use webhook_relay::{Relay, RelayConfig};

fn relay_with(config: RelayConfig) -> Arc<Relay> {
    Arc::new(Relay::from_config(&config).expect("failed to build relay"))
}

fn app() -> (Router, Arc<Relay>) {
    let relay = relay_with(RelayConfig::default());
    (create_router(relay.clone()), relay)
}

fn upsert() -> Value {
    json!({
        "event": "messages.upsert",
        "instance": "main",
        "data": {
            "key": {"remoteJid": "5511999@s.whatsapp.net", "fromMe": false},
            "message": {"conversation": "hi"}
        }
    })
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("failed to make request");
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    let body = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn webhook_is_acknowledged_and_stored() {
    let (app, relay) = app();

    let (status, body) = send(&app, post_json("/webhook", &upsert())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "received": true}));

    let (status, messages) = send(&app, request("GET", "/api/messages")).await;
    assert_eq!(status, StatusCode::OK);

    let messages = messages.as_array().expect("messages should be an array");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["event"], "messages.upsert");
    assert_eq!(messages[0]["data"], upsert()["data"]);
    assert!(messages[0]["receivedAt"].is_string());

    // forwarding is disabled by default
    assert_eq!(relay.forwarder().stats().total(), 0);
}

#[tokio::test]
async fn messages_are_listed_newest_first() {
    let (app, _relay) = app();

    for seq in 0..3 {
        send(&app, post_json("/webhook", &json!({"event": "chats.update", "seq": seq}))).await;
    }

    let (_, messages) = send(&app, request("GET", "/api/messages")).await;
    let seqs: Vec<i64> = messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["seq"].as_i64().unwrap())
        .collect();
    assert_eq!(seqs, vec![2, 1, 0]);
}

#[tokio::test]
async fn history_is_capped_at_one_hundred() {
    let (app, _relay) = app();

    for seq in 1..=150 {
        send(&app, post_json("/webhook", &json!({"seq": seq}))).await;
    }

    let (_, messages) = send(&app, request("GET", "/api/messages")).await;
    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 100);
    assert_eq!(messages[0]["seq"], 150);
    assert_eq!(messages[99]["seq"], 51);
}

#[tokio::test]
async fn empty_and_odd_payloads_are_accepted() {
    let (app, relay) = app();

    let (status, _) = send(&app, post_json("/webhook", &json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, post_json("/webhook", &json!([1, 2]))).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(relay.count().await, 2);
}

#[tokio::test]
async fn empty_body_is_stored_as_empty_object() {
    let (app, relay) = app();

    let req = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "received": true}));

    let (_, messages) = send(&app, request("GET", "/api/messages")).await;
    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0]["receivedAt"].is_string());
    assert!(messages[0]["event"].is_null());
    assert_eq!(relay.count().await, 1);
}

#[tokio::test]
async fn body_without_content_type_is_accepted() {
    let (app, relay) = app();

    let req = Request::builder()
        .method("POST")
        .uri("/webhook")
        .body(Body::from(upsert().to_string()))
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let (_, messages) = send(&app, request("GET", "/api/messages")).await;
    assert_eq!(messages[0]["event"], "messages.upsert");
    assert_eq!(relay.count().await, 1);
}

#[tokio::test]
async fn unparseable_body_is_rejected() {
    let (app, relay) = app();

    let req = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(relay.count().await, 0);
}

#[tokio::test]
async fn clear_empties_history_only() {
    let (app, _relay) = app();
    send(&app, post_json("/webhook", &upsert())).await;
    send(&app, post_json("/webhook", &upsert())).await;

    let (status, body) = send(&app, request("DELETE", "/api/messages")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "cleared": 2}));

    let (_, messages) = send(&app, request("GET", "/api/messages")).await;
    assert_eq!(messages, json!([]));

    let (_, stats) = send(&app, request("GET", "/api/forward-stats")).await;
    assert_eq!(stats["stats"]["total"], 0);
}

#[tokio::test]
async fn summary_counts_categories() {
    let (app, _relay) = app();
    for kind in ["messages.upsert", "messages.update", "chats.upsert", "connection.update"] {
        send(&app, post_json("/webhook", &json!({"event": kind}))).await;
    }
    send(&app, post_json("/webhook", &json!({"no_event": true}))).await;

    let (status, summary) = send(&app, request("GET", "/api/summary")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total"], 5);
    assert_eq!(summary["messages"], 2);
    assert_eq!(summary["chats"], 1);
    assert_eq!(summary["other"], 2);
    assert_eq!(summary["subscribers"], 0);
}

#[tokio::test]
async fn forward_stats_report_configuration() {
    let mut config = RelayConfig::default();
    config.forward.url = "http://downstream.internal:8080/hooks".to_string();
    config.forward.retry_attempts = 4;
    let app = create_router(relay_with(config));

    let (status, body) = send(&app, request("GET", "/api/forward-stats")).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(body["stats"]["total"], 0);
    assert_eq!(body["stats"]["success"], 0);
    assert_eq!(body["stats"]["failed"], 0);
    assert_eq!(body["stats"]["successRate"], 0.0);
    assert!(body["stats"]["lastError"].is_null());

    assert_eq!(body["config"]["enabled"], false);
    assert_eq!(body["config"]["targetUrl"], "http://downstream.internal:8080/hooks");
    assert_eq!(body["config"]["timeoutMs"], 5000);
    assert_eq!(body["config"]["retryAttempts"], 4);
    assert_eq!(body["config"]["retryDelayBaseMs"], 1000);
}

#[tokio::test]
async fn health_is_ok_when_forwarding_disabled() {
    let (app, _relay) = app();

    let (status, body) = send(&app, request("GET", "/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["target"], "disabled");
    assert!(body["uptimeSeconds"].is_u64());
}

#[tokio::test]
async fn index_reports_liveness() {
    let (app, _relay) = app();

    let response = app.oneshot(request("GET", "/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(std::str::from_utf8(&body).unwrap(), "Webhook relay active");
}
