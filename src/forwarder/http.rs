//! reqwest-backed [`Transport`].
//!
//! Posts the payload as JSON with a per-request timeout and folds reqwest's
//! error variants into [`ForwardError`] so the retry loop and the stats can
//! tell a refused connection from a timeout.

use super::{ForwardError, Transport};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde_json::Value;
use std::error::Error as StdError;
use std::time::Duration;
use tracing::debug;

/// User agent sent with every forwarded request
const USER_AGENT: &str = concat!("webhook-relay/", env!("CARGO_PKG_VERSION"));

/// HTTP transport with connection pooling.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// HTTP client (reused for connection pooling)
    client: Client,

    /// Request timeout
    timeout: Duration,
}

impl HttpTransport {
    /// Build a transport whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ForwardError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| ForwardError::Client(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    fn classify(&self, error: reqwest::Error) -> ForwardError {
        if error.is_timeout() {
            return ForwardError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            };
        }

        if error.is_builder() {
            return ForwardError::InvalidUrl(error.to_string());
        }

        let chain = error_chain(&error);
        if is_connection_refused(&error)
            || (error.is_connect() && chain.to_lowercase().contains("refused"))
        {
            return ForwardError::ConnectionRefused;
        }

        ForwardError::Transport(chain)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, url: &str, payload: &Value) -> Result<u16, ForwardError> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status().as_u16();
        debug!(url = %url, status = status, "Forward request completed");
        Ok(status)
    }

    async fn probe(&self, url: &str) -> Result<u16, ForwardError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        Ok(response.status().as_u16())
    }
}

/// Walk the source chain looking for a refused TCP connect.
fn is_connection_refused(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        current = err.source();
    }
    false
}

/// "outer: inner: innermost", reqwest's own Display hides the cause.
fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut current = error.source();
    while let Some(err) = current {
        message.push_str(": ");
        message.push_str(&err.to_string());
        current = err.source();
    }
    message
}
