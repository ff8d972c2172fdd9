//! TechniVerse registrar: entry point.
//!
//! Serves the checkout and payment-verification API for fest registrations
//! and runs a background reconciler that repairs half-settled orders and
//! expires abandoned registrations.

mod api;
mod checkout;
mod config;
mod db;
mod errors;
mod gateway;
mod models;
mod orders;
mod reconciler;
mod signature;
mod validation;
mod verifier;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use checkout::Checkout;
use config::Config;
use gateway::RazorpayGateway;
use orders::OrderInitiator;
use reconciler::ReconcilerState;
use verifier::PaymentVerifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    info!("Gateway: {:?}", config.gateway);

    let pool = db::init_pool(&config.database_url).await?;

    // ─── Payment collaborators ────────────────────────────
    let client = RazorpayGateway::http_client(&config.gateway)?;
    let gateway = Arc::new(RazorpayGateway::new(client, config.gateway.clone()));
    let orders = Arc::new(OrderInitiator::new(
        pool.clone(),
        gateway,
        config.gateway.currency.clone(),
    ));

    // ─── Background reconciler ────────────────────────────
    let shutdown = CancellationToken::new();
    let reconciler_state = Arc::new(ReconcilerState {
        pool: pool.clone(),
        config: config.clone(),
    });
    let reconciler = tokio::spawn(reconciler::run(reconciler_state, shutdown.clone()));

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState {
        pool: pool.clone(),
        orders: orders.clone(),
        verifier: PaymentVerifier::new(pool.clone(), config.gateway.key_secret.clone()),
        checkout: Checkout::new(pool, orders),
    });
    let app = api::router(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    reconciler.await?;
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl+C: {e}");
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
                warn!("Could not listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
