//! API Gateway Library
//!
//! HTTP REST API that authenticates callers and translates requests into
//! gRPC calls against the auth, user and todo services.

pub mod clients;
pub mod config;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use std::net::SocketAddr;

use tracing::info;

use crate::config::GatewayConfig;
use crate::routes::create_router;
use crate::state::AppState;

/// Run the gateway against services listening on `host` (combined binary).
pub async fn run_embedded(
    host: &str,
    port: u16,
    auth_port: u16,
    user_port: u16,
    todo_port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = GatewayConfig::from_env()?.with_local_services(host, auth_port, user_port, todo_port);
    run_server_with_config(host, port, config).await
}

/// Run the HTTP server with the given configuration.
pub async fn run_server_with_config(
    host: &str,
    port: u16,
    config: GatewayConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::from_config(&config)?;
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
