//! Bounded in-memory event history.
//!
//! The [`EventStore`] keeps the most recent events newest-first. Appending
//! past capacity evicts from the tail, so the oldest entries go first. The
//! store itself is plain data; the [`Relay`](crate::relay::Relay) wraps it in
//! a lock for concurrent access.

use crate::event::Event;
use serde_json::Value;
use std::collections::VecDeque;

/// Default number of events retained.
pub const DEFAULT_CAPACITY: usize = 100;

/// Newest-first, capacity-bounded sequence of events.
#[derive(Debug, Clone)]
pub struct EventStore {
    events: VecDeque<Event>,
    capacity: usize,
}

impl EventStore {
    /// Create an empty store holding at most [`DEFAULT_CAPACITY`] events.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an empty store with a custom bound (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Stamp the payload and insert it at the head, evicting from the tail
    /// while over capacity. Returns the stored event.
    pub fn append(&mut self, payload: Value) -> Event {
        self.push(Event::new(payload))
    }

    /// Insert an already stamped event at the head.
    pub fn push(&mut self, event: Event) -> Event {
        self.events.push_front(event.clone());
        self.events.truncate(self.capacity);
        event
    }

    /// Snapshot of all events, newest first.
    pub fn list(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }

    /// The most recently appended event.
    pub fn latest(&self) -> Option<&Event> {
        self.events.front()
    }

    /// Remove every event, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let cleared = self.events.len();
        self.events.clear();
        cleared
    }

    pub fn count(&self) -> usize {
        self.events.len()
    }

    /// Count events satisfying `predicate`.
    pub fn count_matching<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Event) -> bool,
    {
        self.events.iter().filter(|event| predicate(event)).count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}
