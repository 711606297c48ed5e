//! Live fan-out of received events.
//!
//! Every live viewer owns a bounded mailbox. [`Broadcaster::publish`]
//! serializes the event once and offers it to each mailbox with `try_send`,
//! so a slow viewer only ever loses its own copy and never holds up the
//! webhook path or the other viewers.
//!
//! ```text
//!                  ┌──> mailbox A ──> writer task A ──> socket A
//! publish(event) ──┼──> mailbox B (full, skipped)
//!                  └──> mailbox C (closed, removed)
//! ```

use crate::event::Event;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error};
use uuid::Uuid;

/// Default number of undelivered events a single viewer may lag behind.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

type Registry = DashMap<Uuid, mpsc::Sender<String>>;

/// Registry of live subscribers.
pub struct Broadcaster {
    subscribers: Arc<Registry>,
    queue_capacity: usize,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a broadcaster whose subscribers buffer up to `capacity` events.
    pub fn with_queue_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            queue_capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber. It stays registered until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let id = Uuid::new_v4();
        self.subscribers.insert(id, sender);

        debug!(subscriber = %id, total = self.subscribers.len(), "Subscriber added");

        Subscription {
            id,
            receiver,
            registry: Arc::clone(&self.subscribers),
        }
    }

    /// Offer `event` to every subscriber without waiting.
    ///
    /// Subscribers with a full mailbox miss this event; subscribers whose
    /// receiving side is gone are removed. Returns how many accepted it.
    pub fn publish(&self, event: &Event) -> usize {
        if self.subscribers.is_empty() {
            return 0;
        }

        let message = match serde_json::to_string(event) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Failed to serialize event for live subscribers");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut closed = Vec::new();

        for entry in self.subscribers.iter() {
            match entry.value().try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(subscriber = %entry.key(), "Subscriber not ready, skipping event");
                }
                Err(TrySendError::Closed(_)) => closed.push(*entry.key()),
            }
        }

        // removal must wait until the iterator's shard locks are released
        for id in closed {
            self.subscribers.remove(&id);
            debug!(subscriber = %id, "Removed closed subscriber");
        }

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscriber's receiving end.
///
/// Dropping it unregisters the subscriber.
pub struct Subscription {
    id: Uuid,
    receiver: mpsc::Receiver<String>,
    registry: Arc<Registry>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next serialized event. `None` once unregistered.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
        debug!(subscriber = %self.id, "Subscriber removed");
    }
}
