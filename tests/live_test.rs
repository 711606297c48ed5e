//! Live push over WebSocket.
//!
//! Runs the full server on an ephemeral port and connects real clients.

use futures::StreamExt;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use webhook_relay::api::create_router;
use webhook_relay::{Relay, RelayConfig};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn spawn_server() -> (SocketAddr, Arc<Relay>) {
    let relay = Arc::new(Relay::from_config(&RelayConfig::default()).unwrap());
    let app = create_router(relay.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, relay)
}

async fn connect(addr: SocketAddr, relay: &Relay, expected: usize) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    // registration happens after the upgrade completes on the server side
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while relay.broadcaster().subscriber_count() < expected
        && tokio::time::Instant::now() < deadline
    {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    client
}

async fn next_event(client: &mut Client) -> Value {
    let message = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("timed out waiting for live event")
        .expect("stream ended")
        .expect("websocket error");
    serde_json::from_str(message.to_text().unwrap()).unwrap()
}

async fn post_webhook(addr: SocketAddr, body: Value) {
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/webhook"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
}

#[tokio::test]
async fn live_clients_receive_events_in_order() {
    let (addr, relay) = spawn_server().await;
    let mut first = connect(addr, &relay, 1).await;
    let mut second = connect(addr, &relay, 2).await;

    for seq in 0..3 {
        post_webhook(addr, json!({"event": "messages.upsert", "seq": seq})).await;
    }

    for client in [&mut first, &mut second] {
        for seq in 0..3 {
            let event = next_event(client).await;
            assert_eq!(event["event"], "messages.upsert");
            assert_eq!(event["seq"], seq);
            assert!(event["receivedAt"].is_string());
        }
    }
}

#[tokio::test]
async fn disconnected_client_does_not_block_others() {
    let (addr, relay) = spawn_server().await;
    let mut staying = connect(addr, &relay, 1).await;
    let leaving = connect(addr, &relay, 2).await;

    drop(leaving);
    post_webhook(addr, json!({"event": "chats.update"})).await;

    let event = next_event(&mut staying).await;
    assert_eq!(event["event"], "chats.update");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while relay.broadcaster().subscriber_count() > 1 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(relay.broadcaster().subscriber_count(), 1);
    assert_eq!(relay.count().await, 1);
}
