use anyhow::{Context, Result};
use ras_pkce_flow::{InMemorySessionStore, PkceFlow};
use ras_pkce_server::{AppState, Config, create_router, telemetry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    telemetry::init_tracing(&config.logging)?;
    info!("Starting PKCE authorization server");
    match Config::file_source(|key| std::env::var(key).ok()) {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => debug!("No config file found, using defaults and environment"),
    }

    let store = Arc::new(InMemorySessionStore::new());
    let flow = PkceFlow::with_http_provider(config.flow_config(), store)
        .context("Failed to initialize authorization flow")?;
    info!(
        "Authorization flow configured for client {}",
        config.provider.client_id
    );

    if !config.server.secure_cookies {
        warn!("State cookies are not marked Secure; only use this over plain-HTTP localhost");
    }

    let app = create_router(
        AppState::new(Arc::new(flow), &config.server),
        &config.server.route_prefix,
    );

    let bind_addr = config.socket_addr();
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    info!("Server running on http://{}", bind_addr);
    info!(
        "Start a flow at http://{}{}/auth",
        bind_addr, config.server.route_prefix
    );
    info!("OAuth2 redirect URI: {}", config.provider.redirect_uri);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
