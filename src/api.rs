//! HTTP and WebSocket surface.
//!
//! Every handler receives the shared [`Relay`] through axum state.
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | GET | `/` | liveness line |
//! | POST | `/webhook` | ingest one gateway event |
//! | GET | `/api/messages` | stored events, newest first |
//! | DELETE | `/api/messages` | clear stored events |
//! | GET | `/api/summary` | counts per event category |
//! | GET | `/api/forward-stats` | forwarding counters and settings |
//! | GET | `/health` | own health plus downstream reachability |
//! | GET | `/ws` | live push of every new event |

use crate::event::Event;
use crate::relay::Relay;
use crate::summary::MessageSummary;
use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Header used to correlate a webhook with its log lines
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

type AppState = Arc<Relay>;

/// Build the application router.
pub fn create_router(relay: Arc<Relay>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/webhook", post(receive_webhook))
        .route("/api/messages", get(list_messages).delete(clear_messages))
        .route("/api/summary", get(summary))
        .route("/api/forward-stats", get(forward_stats))
        .route("/health", get(health_check))
        .route("/ws", get(live_updates))
        .with_state(relay)
}

async fn index() -> &'static str {
    "Webhook relay active"
}

/// Acknowledgement returned to the gateway.
#[derive(Debug, Serialize)]
struct WebhookAck {
    success: bool,
    received: bool,
}

/// Read a webhook body as JSON regardless of its content type.
///
/// An empty (or whitespace-only) body is taken as `{}`.
fn parse_payload(body: &[u8]) -> Result<Value, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(body)
}

/// Ingestion endpoint. Empty bodies and anything that parses as JSON are
/// accepted.
async fn receive_webhook(
    State(relay): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let payload = match parse_payload(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, bytes = body.len(), "Rejected unparseable webhook body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": format!("invalid JSON: {e}") })),
            )
                .into_response();
        }
    };

    let correlation_id = headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let summary = MessageSummary::from_payload(&payload);
    let event = relay.ingest(payload).await;

    info!(
        event = event.kind().unwrap_or("unknown"),
        instance = event.instance().unwrap_or("-"),
        received_at = %event.received_at_rfc3339(),
        correlation_id = %correlation_id,
        "Webhook received"
    );
    if let Some(summary) = summary {
        summary.log(&correlation_id);
    }

    Json(WebhookAck {
        success: true,
        received: true,
    })
    .into_response()
}

async fn list_messages(State(relay): State<AppState>) -> Json<Vec<Event>> {
    Json(relay.events().await)
}

async fn clear_messages(State(relay): State<AppState>) -> Json<Value> {
    let cleared = relay.clear().await;
    info!(cleared = cleared, "Event history cleared");
    Json(json!({ "success": true, "cleared": cleared }))
}

/// Event categories shown by the dashboard.
fn kind_contains(event: &Event, needle: &str) -> bool {
    event.kind().is_some_and(|kind| kind.contains(needle))
}

async fn summary(State(relay): State<AppState>) -> Json<Value> {
    let total = relay.count().await;
    let messages = relay
        .count_matching(|event| kind_contains(event, "messages"))
        .await;
    let chats = relay
        .count_matching(|event| !kind_contains(event, "messages") && kind_contains(event, "chats"))
        .await;

    Json(json!({
        "total": total,
        "messages": messages,
        "chats": chats,
        "other": total.saturating_sub(messages + chats),
        "subscribers": relay.broadcaster().subscriber_count(),
    }))
}

async fn forward_stats(State(relay): State<AppState>) -> Json<Value> {
    let forwarder = relay.forwarder();
    let stats = forwarder.stats().snapshot().await;

    Json(json!({
        "stats": stats,
        "config": forwarder.settings(),
    }))
}

async fn health_check(State(relay): State<AppState>) -> Response {
    let forwarder = relay.forwarder();
    let uptime = relay.uptime().as_secs();

    let (healthy, target) = if forwarder.is_enabled() {
        let target = forwarder.health_check().await;
        (target.reachable, json!(target))
    } else {
        (true, json!("disabled"))
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        warn!("Health check degraded: forward target unreachable");
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if healthy { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSeconds": uptime,
        "storedEvents": relay.count().await,
        "target": target,
    });

    (status, Json(body)).into_response()
}

/// Upgrade to a WebSocket that streams every newly ingested event.
async fn live_updates(ws: WebSocketUpgrade, State(relay): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, relay))
}

async fn handle_socket(socket: WebSocket, relay: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut subscription = relay.subscribe();
    let subscriber_id = subscription.id();

    info!(subscriber = %subscriber_id, "Live viewer connected");

    // Writer: drain this viewer's mailbox into the socket
    let sender_handle = tokio::spawn(async move {
        while let Some(message) = subscription.recv().await {
            if ws_sender.send(Message::Text(message.into())).await.is_err() {
                break;
            }
        }
        // dropping the subscription here unregisters the viewer
    });

    // Reader: only used to notice the viewer going away
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Ok(_) => debug!(subscriber = %subscriber_id, "Ignoring message from live viewer"),
            Err(e) => {
                warn!(subscriber = %subscriber_id, error = %e, "Live socket error");
                break;
            }
        }
    }

    sender_handle.abort();
    info!(subscriber = %subscriber_id, "Live viewer disconnected");
}
