//! HTTP server for the Prometheus metrics endpoint.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::executor::ScrapeExecutor;
use crate::exposition::{CONTENT_TYPE, render};

/// Time allowed for in-flight requests to finish on stop.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub path: String,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    executor: Arc<ScrapeExecutor>,
}

/// Create the HTTP router.
fn create_router(executor: Arc<ScrapeExecutor>, metrics_path: &str) -> Router {
    let state = AppState { executor };

    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the metrics endpoint: one scrape cycle per poll.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.executor.scrape().await {
        Ok(outcome) => {
            let body = render(&outcome, state.executor.error_count());
            (StatusCode::OK, [("content-type", CONTENT_TYPE)], body).into_response()
        }
        Err(e) => {
            error!(error = %e, "Scrape failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("scrape failed: {}\n", e),
            )
                .into_response()
        }
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

struct Running {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Metrics HTTP server that can be started and stopped repeatedly.
pub struct HttpServer {
    executor: Arc<ScrapeExecutor>,
    config: ServerConfig,
    running: Mutex<Option<Running>>,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(executor: Arc<ScrapeExecutor>, config: ServerConfig) -> Self {
        Self {
            executor,
            config,
            running: Mutex::new(None),
        }
    }

    /// Bind the listener and start serving in the background.
    ///
    /// Returns the bound address. Calling `start` on a running server returns
    /// the current address.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let mut running = self.running.lock().await;
        if let Some(r) = running.as_ref() {
            return Ok(r.addr);
        }

        let listen_addr = self.config.listen_addr();
        let listener = tokio::net::TcpListener::bind(listen_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: listen_addr,
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: listen_addr,
            source,
        })?;

        let router = create_router(Arc::clone(&self.executor), &self.config.path);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        info!(addr = %addr, path = %self.config.path, "HTTP server listening");

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    // Wait for shutdown signal
                    loop {
                        if shutdown_rx.changed().await.is_err() {
                            break;
                        }
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    info!("HTTP server shutting down");
                })
                .await;

            if let Err(e) = served {
                error!(error = %e, "HTTP server error");
            }
            info!("HTTP server stopped");
        });

        *running = Some(Running {
            addr,
            shutdown: shutdown_tx,
            task,
        });

        Ok(addr)
    }

    /// Stop serving and release the listener. No-op when not running.
    pub async fn stop(&self) {
        let Some(mut r) = self.running.lock().await.take() else {
            return;
        };

        let _ = r.shutdown.send(true);
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut r.task).await.is_err() {
            warn!(addr = %r.addr, "HTTP server did not stop in time, aborting");
            r.task.abort();
            let _ = r.task.await;
        }
    }

    /// Address the server is bound to, when running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.addr)
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}
