//! HTTP server for the Prometheus metrics endpoint.
//!
//! Each `/metrics` request triggers one full scrape cycle and serves the
//! snapshot it produced. There is no background polling loop; Prometheus'
//! own scrape interval drives the exporter.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::gauges;
use crate::registry::{CONTENT_TYPE, SharedRegistry};
use crate::scraper::Scraper;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    scraper: Arc<Scraper>,
    registry: SharedRegistry,
    gauges_file: PathBuf,
}

/// Create the HTTP router.
fn create_router(
    scraper: Arc<Scraper>,
    registry: SharedRegistry,
    gauges_file: PathBuf,
    metrics_path: &str,
) -> Router {
    let state = AppState {
        scraper,
        registry,
        gauges_file,
    };

    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the metrics endpoint: scrape, publish, render.
///
/// Always responds 200 while the process is alive. A broken gauge file
/// degrades to an empty-target snapshot; degraded upstream connectivity
/// shows up as failure counts and NaN rows, never as an error response.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let targets = gauges::load_gauges(&state.gauges_file);

    let snapshot = state.scraper.run_cycle(&targets).await;
    state.registry.publish(snapshot);

    let body = state.registry.render();

    (StatusCode::OK, [("content-type", CONTENT_TYPE)], body).into_response()
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// HTTP server for the exposition endpoint.
pub struct HttpServer {
    scraper: Arc<Scraper>,
    registry: SharedRegistry,
    gauges_file: PathBuf,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(
        scraper: Arc<Scraper>,
        registry: SharedRegistry,
        gauges_file: PathBuf,
        listen_addr: SocketAddr,
        metrics_path: String,
    ) -> Self {
        Self {
            scraper,
            registry,
            gauges_file,
            listen_addr,
            metrics_path,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(
            self.scraper,
            self.registry,
            self.gauges_file,
            &self.metrics_path,
        );

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
