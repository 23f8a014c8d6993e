//! Fleetd Gateway - HTTP entry point for the controller.
//!
//! Serves login and RPC dispatch over the shared state store.
//!
//! # Configuration
//!
//! - `FLEETD_LISTEN_ADDR` - listen address (default `0.0.0.0:17070`)
//! - `FLEETD_DATA_DIR` - state store directory (default `/var/lib/fleetd`)
//! - `FLEETD_SUBSTRATE` - `manual` (default) or `catalog`
//! - `FLEETD_ADMIN_PASSWORD` - bootstrap an `admin` user on first start

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetd_gateway::{create_router, GatewayConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fleetd=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting fleetd gateway");

    let config = GatewayConfig::from_env();
    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        substrate = ?config.substrate,
        "Gateway configuration loaded"
    );

    let state = fleetd_gateway::build_gateway(config.clone())?;
    let app = create_router(state);

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install shutdown handler");
        return;
    }
    tracing::info!("Shutting down");
}
