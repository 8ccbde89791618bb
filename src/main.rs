//! GraphQL WS Server - Binary Entry Point
//!
//! Serves the demo executor over graphql-ws. Configuration comes from
//! `GQL_WS_*` environment variables, log filtering from `RUST_LOG`.

use std::error::Error;
use std::sync::Arc;

use graphql_ws_server::api::{create_router, websocket::AppState};
use graphql_ws_server::demo::DemoExecutor;
use graphql_ws_server::{JwtAuth, ServerConfig, SubscriptionServer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();

    let mut server = SubscriptionServer::new(Arc::new(DemoExecutor::new()))
        .with_options(config.protocol_options());

    match &config.jwt_secret {
        Some(secret) => {
            server = server.with_hooks(Arc::new(JwtAuth::new(secret)?));
            info!("JWT authentication enabled");
        }
        None => warn!("GQL_WS_JWT_SECRET not set; accepting all connections"),
    }

    let state = Arc::new(AppState::new(server));
    let app = create_router(state, &config.path);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(
        "{} v{} listening on ws://{}{}",
        graphql_ws_server::NAME,
        graphql_ws_server::VERSION,
        listener.local_addr()?,
        config.path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
