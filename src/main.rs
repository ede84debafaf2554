use std::sync::Arc;
use tracing::{info, warn};

use etsy_research::{server, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = dotenv {
        if !e.not_found() {
            warn!("Failed to load .env: {}", e);
        }
    }

    let config = Config::from_env()?;
    info!("Starting Etsy research service");
    info!("Target: {}", config.target_base_url);
    info!(
        "Bots: {}, proxies: {}, cache: {}",
        config.pool_size,
        config.proxy_endpoints.len(),
        if config.cache.enabled { "enabled" } else { "disabled" }
    );

    let bind_addr = config.bind_addr;
    let state = Arc::new(AppState::new(config)?);
    let app = server::router(state.clone());

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
