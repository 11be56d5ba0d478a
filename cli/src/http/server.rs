//! `taleforge serve`: HTTP server lifecycle.

use std::net::SocketAddr;

use axum::middleware;
use taleforge_core::api::{AppConfig, CliError, Orchestrator};
use tokio::signal;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::{
    middleware::{create_middleware_stack, request_logger},
    routes::create_router,
    AppState,
};
use crate::commands::cli::ServeArgs;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// CLI flags win over `[http_server]`.
    pub fn resolve(args: &ServeArgs, cfg: &AppConfig) -> Self {
        Self {
            host: args
                .host
                .clone()
                .unwrap_or_else(|| cfg.http_server.host.clone()),
            port: args.port.unwrap_or(cfg.http_server.port),
        }
    }
}

pub async fn handle_serve(
    args: ServeArgs,
    cfg: &AppConfig,
    orchestrator: Orchestrator,
) -> Result<(), CliError> {
    let interrupted = orchestrator.reconcile_interrupted().await?;
    if interrupted > 0 {
        info!(interrupted, "previous run left unfinished tasks, marked failed");
    }

    let config = ServerConfig::resolve(&args, cfg);
    let (shutdown_tx, _) = broadcast::channel(1);
    let state = AppState::new(orchestrator.clone(), shutdown_tx);

    start_server(config, state)
        .await
        .map_err(|e| CliError::Command(e.to_string()))?;

    info!("draining running tasks");
    orchestrator.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

pub async fn start_server(
    config: ServerConfig,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(state.clone())
        .layer(middleware::from_fn(request_logger))
        .layer(TraceLayer::new_for_http())
        .layer(create_middleware_stack());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        pipeline = state.orchestrator.pipeline_name(),
        "HTTP server listening on http://{}", addr
    );

    let mut shutdown_rx = state.shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C signal");
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal from API");
                }
                _ = wait_for_sigterm() => {
                    info!("Received SIGTERM signal");
                }
            }
            info!("Starting graceful shutdown...");
        })
        .await?;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler");
            std::future::pending::<()>().await
        }
    }
}

/// No SIGTERM on Windows; Ctrl+C and the shutdown endpoint still work.
#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cfg = AppConfig::default();
        let resolved = ServerConfig::resolve(
            &ServeArgs {
                host: None,
                port: Some(9000),
            },
            &cfg,
        );
        assert_eq!(resolved.host, "127.0.0.1");
        assert_eq!(resolved.port, 9000);
    }
}
