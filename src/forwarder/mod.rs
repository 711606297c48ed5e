//! Downstream forwarding with retry and backoff.
//!
//! The [`Forwarder`] relays each received payload to one configured URL.
//! Delivery runs as a detached task so the webhook response never waits on
//! the downstream service. Transport failures (refused connection, DNS,
//! timeout, other I/O) are retried with exponential backoff; any HTTP
//! response, whatever its status, ends the sequence as a success.
//!
//! ```text
//! attempt 1 ──fail──> wait base ──> attempt 2 ──fail──> wait 2*base ──> attempt 3 ...
//! ```
//!
//! The wire side sits behind the [`Transport`] trait; [`HttpTransport`] is the
//! reqwest implementation used in production.
//!
//! # Example
//!
//! ```rust,ignore
//! use webhook_relay::forwarder::{Forwarder, HttpTransport, RetryPolicy};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let timeout = Duration::from_secs(5);
//! let transport = Arc::new(HttpTransport::new(timeout)?);
//! let forwarder = Forwarder::new("http://localhost:3001/webhook", transport)
//!     .with_timeout(timeout)
//!     .with_retry_policy(RetryPolicy::new(3, Duration::from_secs(1)));
//!
//! forwarder.submit(payload); // returns immediately
//! ```

pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub use http::HttpTransport;

/// Per-attempt timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Timeout for the downstream health probe.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_millis(3000);

/// Total delivery attempts (first try included).
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Delay before the first retry; doubles for each later retry.
pub const DEFAULT_RETRY_DELAY_BASE: Duration = Duration::from_millis(1000);

/// Path probed on the target host by [`Forwarder::health_check`].
pub const HEALTH_PATH: &str = "/health";

/// Errors raised while delivering to the downstream target.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForwardError {
    /// Nothing is listening at the target address
    #[error("connection refused: target service unavailable")]
    ConnectionRefused,

    /// No response within the per-attempt timeout
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// DNS failure, reset connection or any other I/O problem
    #[error("transport error: {0}")]
    Transport(String),

    /// The target URL cannot be used at all
    #[error("invalid target URL: {0}")]
    InvalidUrl(String),

    /// The HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl ForwardError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ForwardError::ConnectionRefused
                | ForwardError::Timeout { .. }
                | ForwardError::Transport(_)
        )
    }
}

/// The wire side of forwarding.
///
/// Implementations report any received HTTP response as `Ok(status)` and
/// reserve `Err` for failures where no response came back.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST the payload as JSON to `url`.
    async fn send(&self, url: &str, payload: &Value) -> Result<u16, ForwardError>;

    /// Lightweight GET against `url`.
    async fn probe(&self, url: &str) -> Result<u16, ForwardError>;
}

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1)
    pub attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    /// Delay to wait before `attempt` (1-based). Zero for the first attempt,
    /// then `base * 2^(attempt - 2)`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let multiplier = 2_u32.saturating_pow(attempt - 2);
        self.base_delay.saturating_mul(multiplier)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY_BASE)
    }
}

#[derive(Debug, Default)]
struct LastOutcome {
    success_at: Option<DateTime<Utc>>,
    failure_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

/// Aggregate forwarding counters.
///
/// `total` moves when an event is submitted, `success` or `failed` when its
/// retry sequence ends, so `success + failed <= total` at all times.
#[derive(Debug, Default)]
pub struct ForwardStats {
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    last: Mutex<LastOutcome>,
}

impl ForwardStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_submitted(&self) {
        self.total.fetch_add(1, Ordering::SeqCst);
    }

    async fn record_success(&self) {
        let mut last = self.last.lock().await;
        self.success.fetch_add(1, Ordering::SeqCst);
        last.success_at = Some(Utc::now());
    }

    async fn record_failure(&self, error: &ForwardError) {
        let mut last = self.last.lock().await;
        self.failed.fetch_add(1, Ordering::SeqCst);
        last.failure_at = Some(Utc::now());
        last.error = Some(error.to_string());
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn success(&self) -> u64 {
        self.success.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Consistent copy of the counters with derived rates.
    pub async fn snapshot(&self) -> StatsSnapshot {
        let last = self.last.lock().await;
        let total = self.total();
        let success = self.success();
        let failed = self.failed();

        StatsSnapshot {
            total,
            success,
            failed,
            pending: total.saturating_sub(success + failed),
            success_rate: percentage(success, total),
            failure_rate: percentage(failed, total),
            last_success: last.success_at,
            last_failure: last.failure_at,
            last_error: last.error.clone(),
        }
    }
}

/// Percentage rounded to one decimal, 0 when nothing was submitted.
fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = part as f64 / total as f64 * 100.0;
    (raw * 10.0).round() / 10.0
}

/// Point-in-time view of [`ForwardStats`].
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    /// Submitted events whose retry sequence is still running
    pub pending: u64,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Effective forwarding configuration, as reported by the stats endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ForwarderSettings {
    pub enabled: bool,
    pub target_url: String,
    pub timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_base_ms: u64,
}

/// Successful end of a retry sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Attempts used, including the one that succeeded
    pub attempts: u32,

    /// HTTP status returned by the target
    pub status: u16,
}

/// Reachability of the downstream target.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TargetHealth {
    pub url: String,
    pub reachable: bool,
    pub status: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Relays events to a single downstream URL.
///
/// Cloning is cheap and clones share the same statistics.
#[derive(Clone)]
pub struct Forwarder {
    url: String,
    enabled: bool,
    timeout: Duration,
    health_timeout: Duration,
    policy: RetryPolicy,
    transport: Arc<dyn Transport>,
    stats: Arc<ForwardStats>,
}

impl Forwarder {
    /// Create an enabled forwarder sending through `transport`.
    pub fn new(url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            url: url.into(),
            enabled: true,
            timeout: DEFAULT_TIMEOUT,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            policy: RetryPolicy::default(),
            transport,
            stats: Arc::new(ForwardStats::new()),
        }
    }

    /// Set the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the health probe timeout
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Turn forwarding on or off. A disabled forwarder ignores submissions.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn stats(&self) -> &ForwardStats {
        &self.stats
    }

    pub fn settings(&self) -> ForwarderSettings {
        ForwarderSettings {
            enabled: self.enabled,
            target_url: self.url.clone(),
            timeout_ms: duration_ms(self.timeout),
            retry_attempts: self.policy.attempts,
            retry_delay_base_ms: duration_ms(self.policy.base_delay),
        }
    }

    /// Start delivering `payload` in a detached task and return immediately.
    ///
    /// Counts one submission; the outcome lands in [`ForwardStats`] once the
    /// retry sequence finishes. No-op when forwarding is disabled.
    pub fn submit(&self, payload: Value) {
        if !self.enabled {
            return;
        }

        self.stats.record_submitted();
        let forwarder = self.clone();
        tokio::spawn(async move {
            // outcome is already recorded in the stats
            let _ = forwarder.run(&payload).await;
        });
    }

    /// Deliver `payload` and wait for the outcome.
    ///
    /// Same accounting as [`submit`](Self::submit), including the no-op when
    /// disabled (reported as `Ok(None)`).
    pub async fn deliver(&self, payload: &Value) -> Result<Option<Delivery>, ForwardError> {
        if !self.enabled {
            return Ok(None);
        }

        self.stats.record_submitted();
        self.run(payload).await.map(Some)
    }

    /// Retry loop for one submitted payload.
    async fn run(&self, payload: &Value) -> Result<Delivery, ForwardError> {
        let attempts = self.policy.attempts;
        let mut attempt = 1;

        loop {
            match self.attempt(payload).await {
                Ok(status) => {
                    if !(200..300).contains(&status) {
                        warn!(
                            url = %self.url,
                            status = status,
                            attempt = attempt,
                            "Target answered with a non-success status"
                        );
                    }
                    info!(
                        url = %self.url,
                        status = status,
                        attempt = attempt,
                        "Event forwarded"
                    );
                    self.stats.record_success().await;
                    return Ok(Delivery {
                        attempts: attempt,
                        status,
                    });
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        url = %self.url,
                        error = %e,
                        attempt = attempt,
                        max_attempts = attempts,
                        "Forward attempt failed"
                    );

                    attempt += 1;
                    let delay = self.policy.delay_before(attempt);
                    debug!(
                        attempt = attempt,
                        delay_ms = duration_ms(delay),
                        "Retrying forward after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        url = %self.url,
                        error = %e,
                        attempts = attempt,
                        "Forwarding failed, giving up"
                    );
                    self.stats.record_failure(&e).await;
                    return Err(e);
                }
            }
        }
    }

    /// One timed delivery attempt.
    async fn attempt(&self, payload: &Value) -> Result<u16, ForwardError> {
        match tokio::time::timeout(self.timeout, self.transport.send(&self.url, payload)).await {
            Ok(result) => result,
            Err(_) => Err(ForwardError::Timeout {
                timeout_ms: duration_ms(self.timeout),
            }),
        }
    }

    /// Probe the target's health URL (same origin, [`HEALTH_PATH`]).
    ///
    /// Any response counts as reachable; the status is reported alongside.
    pub async fn health_check(&self) -> TargetHealth {
        let url = match health_url(&self.url) {
            Ok(url) => url,
            Err(e) => {
                return TargetHealth {
                    url: self.url.clone(),
                    reachable: false,
                    status: None,
                    latency_ms: 0,
                    error: Some(e.to_string()),
                }
            }
        };

        let started = Instant::now();
        let result = match tokio::time::timeout(self.health_timeout, self.transport.probe(&url))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ForwardError::Timeout {
                timeout_ms: duration_ms(self.health_timeout),
            }),
        };
        let latency_ms = duration_ms(started.elapsed());

        match result {
            Ok(status) => {
                debug!(url = %url, status = status, latency_ms = latency_ms, "Target reachable");
                TargetHealth {
                    url,
                    reachable: true,
                    status: Some(status),
                    latency_ms,
                    error: None,
                }
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Target unreachable");
                TargetHealth {
                    url,
                    reachable: false,
                    status: None,
                    latency_ms,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Derive the health probe URL: same scheme, host and port, path replaced
/// by [`HEALTH_PATH`], query and fragment dropped.
pub fn health_url(target: &str) -> Result<String, ForwardError> {
    let mut url =
        reqwest::Url::parse(target).map_err(|e| ForwardError::InvalidUrl(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(ForwardError::InvalidUrl(format!("{target} has no host")));
    }
    url.set_path(HEALTH_PATH);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
