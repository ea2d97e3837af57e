//! Server setup and lifecycle for the auth data server.
//!
//! The gRPC service and the plaintext health endpoint share one port: gRPC
//! requests are routed to the `GatewayEndpoints` service, everything else to
//! the plain HTTP routes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tonic::service::Routes;
use tower_http::trace::TraceLayer;

use crate::catalog::EndpointCatalog;
use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::hub::UpdateHub;
use crate::pipe::run_update_pipe;
use crate::proto::gateway_endpoints_server::GatewayEndpointsServer;
use crate::service::AuthDataService;
use crate::source::build_data_source;

/// Runs the server: builds the configured data source, seeds the catalog,
/// starts the update pipe, and serves until shutdown.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let source = build_data_source(&config.source).await?;

    let initial_data = source.fetch_auth_data().await?;
    tracing::info!(
        num_gateway_endpoints = initial_data.len(),
        "loaded initial auth data"
    );

    let catalog = Arc::new(EndpointCatalog::new());
    catalog.seed(initial_data).await;

    let hub = Arc::new(UpdateHub::new());

    let updates = source
        .subscribe_updates()
        .ok_or_else(|| ServerError::Config("data source update channel already taken".to_string()))?;
    let pipe_handle = tokio::spawn(run_update_pipe(catalog.clone(), hub.clone(), updates));

    let service = AuthDataService::new(catalog, hub);
    let grpc_router = Routes::new(GatewayEndpointsServer::new(service)).into_axum_router();

    let app = Router::new()
        .route("/healthz", get(healthz))
        .merge(grpc_router)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| ServerError::Config(format!("invalid bind address: {e}")))?;

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

    tracing::info!(%addr, "auth data server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServerError::Transport(format!("server error: {e}")))?;

    // Dropping the source aborts its listener/watcher task; the pipe exits
    // once the update channel closes, but does not outlive the process.
    pipe_handle.abort();
    drop(source);

    tracing::info!("auth data server stopped");
    Ok(())
}

/// Entry point for running the server from environment variables.
pub async fn run_from_env() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    run_server(config).await
}

/// Health probe for the shared port.
async fn healthz() -> &'static str {
    "OK"
}

/// Resolves on SIGINT or SIGTERM. The serve loop then stops accepting new
/// streams and the data source tasks are torn down.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
        "SIGTERM"
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    let signal = tokio::select! {
        signal = ctrl_c => signal,
        signal = terminate => signal,
    };

    tracing::info!(signal, "shutting down auth data distribution");
}
