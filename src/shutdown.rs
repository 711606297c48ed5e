//! Graceful shutdown coordination.
//!
//! [`ShutdownSignal`] resolves when the process receives Ctrl+C or SIGTERM
//! (or when triggered programmatically) and fans that out to every holder of
//! a clone. The HTTP server uses it for `with_graceful_shutdown` and stops
//! waiting for open connections (live sockets included) once the grace
//! period has passed. Detached forwarding tasks are not awaited.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::future::IntoFuture;
//! use webhook_relay::shutdown::ShutdownSignal;
//!
//! let shutdown = ShutdownSignal::new();
//! tokio::spawn(shutdown.clone().listen());
//!
//! let server = axum::serve(listener, app)
//!     .with_graceful_shutdown(shutdown.clone().wait())
//!     .into_future();
//!
//! tokio::select! {
//!     result = server => result?,
//!     () = shutdown.grace_period_elapsed() => {}
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Default grace period for in-flight requests.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// A signal for coordinating graceful shutdown across components.
#[derive(Clone)]
pub struct ShutdownSignal {
    /// Broadcast sender for shutdown notification
    sender: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
    /// Grace period before the process gives up waiting
    timeout: Duration,
}

impl ShutdownSignal {
    /// Create a new shutdown signal with the default 30 second grace period.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Create a new shutdown signal with custom grace period.
    pub fn with_timeout(timeout: Duration) -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            triggered: Arc::new(AtomicBool::new(false)),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for SIGINT or SIGTERM, then notify every waiter.
    pub async fn listen(self) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }

        self.notify();
    }

    /// Trigger shutdown manually (for testing or programmatic shutdown).
    pub fn trigger(&self) {
        info!("Shutdown triggered programmatically");
        self.notify();
    }

    fn notify(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        let _ = self.sender.send(());
    }

    /// Whether shutdown has been triggered.
    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been triggered.
    pub async fn wait(self) {
        let mut receiver = self.sender.subscribe();
        if self.is_shutdown() {
            return;
        }
        let _ = receiver.recv().await;
    }

    /// Resolve once shutdown has been triggered and the grace period has
    /// run out.
    pub async fn grace_period_elapsed(self) {
        let timeout = self.timeout;
        self.wait().await;
        tokio::time::sleep(timeout).await;
        warn!(
            timeout_secs = timeout.as_secs(),
            "Shutdown grace period elapsed, dropping remaining connections"
        );
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
