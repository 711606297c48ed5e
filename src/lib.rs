//! # Webhook Relay
//!
//! Receives WhatsApp gateway webhooks, keeps a bounded in-memory history,
//! pushes each event to live viewers and forwards it to a downstream
//! service with retry and backoff.
//!
//! ## Architecture
//!
//! ```text
//!                            ┌──> Broadcaster ──> WebSocket viewers
//! Gateway -> POST /webhook ──┼──> EventStore (newest 100)
//!                            └──> Forwarder ──retry──> downstream URL
//! ```
//!
//! ## Modules
//!
//! - [`event`]: Received event (payload + `receivedAt`)
//! - [`store`]: Bounded newest-first history
//! - [`forwarder`]: Downstream delivery, retry policy and statistics
//! - [`broadcast`]: Live fan-out with a mailbox per subscriber
//! - [`relay`]: Shared core state and the ingestion operation
//! - [`api`]: axum routes
//! - [`config`]: TOML + environment configuration

pub mod api;
pub mod broadcast;
pub mod config;
pub mod event;
pub mod forwarder;
pub mod relay;
pub mod shutdown;
pub mod store;
pub mod summary;

// Re-export commonly used types at crate root
pub use broadcast::{Broadcaster, Subscription};
pub use config::RelayConfig;
pub use event::Event;
pub use forwarder::{ForwardError, ForwardStats, Forwarder, RetryPolicy, Transport};
pub use relay::Relay;
pub use store::EventStore;
