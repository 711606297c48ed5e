use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use webhook_relay::api::create_router;
use webhook_relay::shutdown::ShutdownSignal;
use webhook_relay::{Relay, RelayConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize Logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load Configuration
    let config = RelayConfig::load()?;

    // 3. Build the relay core
    let relay = Arc::new(Relay::from_config(&config)?);
    let forward = relay.forwarder().settings();
    if forward.enabled {
        info!(
            target_url = %forward.target_url,
            timeout_ms = forward.timeout_ms,
            retry_attempts = forward.retry_attempts,
            "Forwarding enabled"
        );
    } else {
        info!("Forwarding disabled");
    }

    // 4. Build Router
    let app = create_router(relay);

    // 5. Start Server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Webhook relay listening on {}", addr);

    let shutdown =
        ShutdownSignal::with_timeout(Duration::from_secs(config.server.shutdown_timeout_secs));
    tokio::spawn(shutdown.clone().listen());
    info!(
        grace_secs = shutdown.timeout().as_secs(),
        "Shutdown handler installed"
    );

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().wait())
        .into_future();

    // open live sockets hold graceful shutdown until the grace period ends
    tokio::select! {
        result = server => result?,
        () = shutdown.grace_period_elapsed() => {}
    }

    info!("Webhook relay stopped");
    Ok(())
}
