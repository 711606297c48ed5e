//! The relay core: one owned object shared by every handler.
//!
//! [`Relay`] bundles the event history, the live broadcaster and the
//! forwarder. It is built once at startup, wrapped in `Arc` and injected
//! into the HTTP layer; nothing here is global.
//!
//! # Ingestion
//!
//! ```text
//! payload ──> store.append ──> broadcaster.publish ──> forwarder.submit ──> ack
//!             (write lock held for append + publish)   (detached task)
//! ```

use crate::broadcast::{Broadcaster, Subscription};
use crate::config::RelayConfig;
use crate::event::Event;
use crate::forwarder::{ForwardError, Forwarder, HttpTransport, RetryPolicy, Transport};
use crate::store::EventStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Shared relay state.
pub struct Relay {
    store: RwLock<EventStore>,
    broadcaster: Broadcaster,
    forwarder: Forwarder,
    started_at: Instant,
}

impl Relay {
    /// Assemble a relay from its parts.
    pub fn new(store: EventStore, broadcaster: Broadcaster, forwarder: Forwarder) -> Self {
        Self {
            store: RwLock::new(store),
            broadcaster,
            forwarder,
            started_at: Instant::now(),
        }
    }

    /// Build a relay from configuration, forwarding over HTTP.
    pub fn from_config(config: &RelayConfig) -> Result<Self, ForwardError> {
        let transport = HttpTransport::new(Duration::from_millis(config.forward.timeout_ms))?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Build a relay from configuration with a custom forwarding transport.
    pub fn with_transport(config: &RelayConfig, transport: Arc<dyn Transport>) -> Self {
        let forward = &config.forward;
        let forwarder = Forwarder::new(&forward.url, transport)
            .with_enabled(forward.enabled)
            .with_timeout(Duration::from_millis(forward.timeout_ms))
            .with_health_timeout(Duration::from_millis(forward.health_timeout_ms))
            .with_retry_policy(RetryPolicy::new(
                forward.retry_attempts,
                Duration::from_millis(forward.retry_delay_base_ms),
            ));

        Self::new(
            EventStore::with_capacity(config.store.capacity),
            Broadcaster::with_queue_capacity(config.live.queue_capacity),
            forwarder,
        )
    }

    /// Accept one webhook payload.
    ///
    /// Stores it, pushes it to live subscribers and hands it to the
    /// forwarder, then returns without waiting for the forward outcome.
    pub async fn ingest(&self, payload: Value) -> Event {
        let event = {
            let mut store = self.store.write().await;
            let event = store.append(payload);
            // publishing under the lock keeps live order equal to store order
            let delivered = self.broadcaster.publish(&event);
            debug!(
                stored = store.count(),
                live_subscribers = delivered,
                "Event stored and published"
            );
            event
        };

        self.forwarder.submit(event.payload.clone());
        event
    }

    /// Stored events, newest first.
    pub async fn events(&self) -> Vec<Event> {
        self.store.read().await.list()
    }

    /// Drop all stored events. Forwarding statistics are left alone.
    pub async fn clear(&self) -> usize {
        self.store.write().await.clear()
    }

    pub async fn count(&self) -> usize {
        self.store.read().await.count()
    }

    /// Count stored events matching `predicate`.
    pub async fn count_matching<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Event) -> bool,
    {
        self.store.read().await.count_matching(predicate)
    }

    /// Register a live subscriber.
    pub fn subscribe(&self) -> Subscription {
        self.broadcaster.subscribe()
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
