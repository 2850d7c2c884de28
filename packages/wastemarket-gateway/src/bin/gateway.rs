//! Waste marketplace gateway binary.

use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wastemarket_gateway::{create_router, AppState, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting waste marketplace gateway");

    // File is optional and every field defaults; an error is a malformed value.
    let config = Config::load().map_err(|e| {
        error!(
            error = %e,
            "FATAL: config error, fix WASTEMARKET_* env vars or wastemarket.toml"
        );
        e
    })?;

    if std::env::var("WASTEMARKET_API_KEY")
        .map(|k| !k.is_empty())
        .unwrap_or(false)
    {
        info!("API key auth enabled");
    } else {
        warn!("WASTEMARKET_API_KEY not set, /mint and /purchase are unprotected (dev mode)");
    }

    info!(
        contract = %config.contract_address,
        contract_id = %config.contract_id,
        chain_id = config.chain_id,
        rpc = %config.rpc_url,
        wallet = %config.wallet_rpc_url,
        "Configuration loaded"
    );

    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState::new(config)?);

    let verification = state.market.verify_contract().await;
    info!(
        rpc_working = verification.rpc_working,
        mirror_confirmed = verification.mirror_node_confirmed,
        approach = ?verification.recommended_approach,
        "Contract verified"
    );

    let app = create_router(state);

    info!(address = %bind_address, "Listening");

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => info!("Received SIGINT, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
