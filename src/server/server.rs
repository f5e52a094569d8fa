use anyhow::{anyhow, Result};
use axum::Router;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

use crate::config::settings::SettingsConfig;
use crate::manager::TokenManager;
use crate::observability::metrics::{get_metrics, Metrics};
use crate::observability::routes::MetricsState;
use crate::server::token_routes::TokenRouteState;

#[derive(Clone)]
pub struct AppState {
    pub metrics_state: MetricsState,
    pub token_state: TokenRouteState,
}

impl AppState {
    pub fn new(metrics: &Metrics, manager: TokenManager) -> Self {
        Self {
            metrics_state: MetricsState::new(metrics.registry.clone()),
            token_state: TokenRouteState::new(manager),
        }
    }
}

pub async fn router(settings_config: &SettingsConfig, manager: TokenManager) -> Router {
    let metrics = get_metrics().await;
    let state = AppState::new(metrics, manager);

    Router::new()
        .merge(state.metrics_state.router(&settings_config.metrics))
        .merge(state.token_state.router())
        .with_state(state)
}

/// Serve the token and metrics routes until SIGINT/SIGTERM.
pub async fn start(settings_config: &SettingsConfig, manager: TokenManager) -> Result<()> {
    let server = settings_config
        .server
        .as_ref()
        .ok_or_else(|| anyhow!("settings.server must be configured to serve tokens"))?;

    let app = router(settings_config, manager).await;
    let address = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| anyhow!("cannot bind '{}': {}", address, e))?;

    let metrics = get_metrics().await;
    metrics.up.set(1);
    info!("listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    metrics.up.set(0);
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        _ => {
            // no signal handlers, fall back to ctrl-c
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT (Ctrl+C). Initiating graceful shutdown..."),
        _ = sigterm.recv() => info!("Received SIGTERM. Initiating graceful shutdown..."),
    }
}
