//! b402 payment-gated AI processing server.
//!
//! # Usage
//!
//! ```bash
//! # Settings come from flags, the environment, or a .env file
//! PAYMENT_ADDRESS=0x... RELAYER_CONTRACT=0x... FACILITATOR_URL=https://... \
//! OPENAI_API_KEY=sk-... cargo run -p b402-server --release
//!
//! # Configure logging level
//! RUST_LOG=debug cargo run -p b402-server
//! ```
//!
//! See [`b402_server::config`] for every setting.

use std::sync::Arc;

use axum::http::{HeaderName, Method};
use b402_http::constants::X_PAYMENT_RESPONSE_HEADER;
use b402_http::server::{B402Middleware, FacilitatorClient};
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use b402_server::config::AppConfig;
use b402_server::provider;
use b402_server::routes::{AppState, router};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Server failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    tracing::info!(
        addr = %config.addr(),
        network = %config.payment.network,
        price = %config.payment.price,
        token = %config.payment.token,
        pay_to = %config.payment.pay_to,
        facilitator = %config.facilitator_url,
        "Loaded configuration"
    );

    let facilitator = FacilitatorClient::try_from(config.facilitator_url.as_str())?
        .with_timeout(config.verifier_timeout);
    let middleware =
        B402Middleware::new(Arc::new(facilitator)).with_verifier_timeout(config.verifier_timeout);
    let provider = provider::from_config(&config.provider)?;

    let addr = config.addr();
    let state = AppState {
        config: Arc::new(config),
        provider: Arc::from(provider),
    };

    let app = router(state, &middleware)
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any)
                .expose_headers([HeaderName::from_bytes(X_PAYMENT_RESPONSE_HEADER.as_bytes())?]),
        );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl-C");
        tracing::info!("Received Ctrl-C, shutting down...");
    }
}
