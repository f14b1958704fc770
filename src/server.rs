//! HTTP server for the Prometheus metrics endpoint.

use crate::config::WebConfig;
use crate::registry::encode_text;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;

/// Errors that can occur during metrics server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    #[error("server error: {0}")]
    Server(String),
}

#[derive(Clone)]
struct AppState {
    registry: Arc<Registry>,
    telemetry_path: Arc<str>,
}

/// HTTP server exposing a Prometheus registry.
pub struct MetricsServer {
    bind_addr: SocketAddr,
    state: AppState,
}

impl MetricsServer {
    /// Creates a new metrics server.
    pub fn new(config: &WebConfig, registry: Registry) -> Self {
        Self {
            bind_addr: config.listen_address,
            state: AppState {
                registry: Arc::new(registry),
                telemetry_path: Arc::from(config.telemetry_path.as_str()),
            },
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/", get(landing_handler))
            .route(&self.state.telemetry_path, get(metrics_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Starts the HTTP server.
    ///
    /// Runs until Ctrl-C is received.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        tracing::info!(
            addr = %self.bind_addr,
            path = %self.state.telemetry_path,
            "Metrics server listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

/// Handler for the telemetry endpoint.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match encode_text(&state.registry) {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

async fn landing_handler(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html><head><title>Puppet Exporter</title></head><body>\
         <h1>Puppet Exporter</h1><p><a href=\"{}\">Metrics</a></p></body></html>",
        state.telemetry_path
    ))
}

/// Handler for the /health endpoint.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
