//! `WaypointServer`: Axum HTTP ingestion + WebSocket fan-out.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{DefaultBodyLimit, State, WebSocketUpgrade};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use waypoint_core::{Clock, SystemClock};
use waypoint_store::Persister;

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::ingest::IngestionPipeline;
use crate::metrics::{INGEST_REQUESTS_TOTAL, WS_UPGRADE_FAILURES_TOTAL};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{Broadcaster, ConnectionRegistry, SubscriberLifecycle};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Ingestion pipeline.
    pub pipeline: Arc<IngestionPipeline>,
    /// Live subscribers.
    pub registry: Arc<ConnectionRegistry>,
    /// Subscriber connection driver.
    pub lifecycle: Arc<SubscriberLifecycle>,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
}

/// The Waypoint server.
pub struct WaypointServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    pipeline: Arc<IngestionPipeline>,
    lifecycle: Arc<SubscriberLifecycle>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl WaypointServer {
    /// Create a server stamping reports with the system clock.
    pub fn new(config: ServerConfig, persister: Arc<dyn Persister>) -> Self {
        Self::with_clock(config, persister, Arc::new(SystemClock))
    }

    /// Create a server with an explicit timestamp source.
    pub fn with_clock(
        config: ServerConfig,
        persister: Arc<dyn Persister>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(
            Arc::clone(&registry),
            config.payload_schema,
        ));
        let pipeline = Arc::new(IngestionPipeline::new(
            config.payload_schema,
            clock,
            persister,
            Arc::clone(&broadcaster),
            config.max_in_flight,
        ));
        let lifecycle = Arc::new(SubscriberLifecycle::new(
            broadcaster,
            &config,
            shutdown.token(),
        ));
        Self {
            config,
            registry,
            pipeline,
            lifecycle,
            shutdown,
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from this Prometheus handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            pipeline: Arc::clone(&self.pipeline),
            registry: Arc::clone(&self.registry),
            lifecycle: Arc::clone(&self.lifecycle),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/location", post(ingest_handler))
            .route("/update-location", post(ingest_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown is signalled.
    pub async fn listen(&self) -> std::io::Result<ServerHandle> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            schema = %self.config.payload_schema,
            "waypoint server listening"
        );

        let router = self.router();
        let token = self.shutdown.token();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        });

        Ok(ServerHandle { local_addr, task })
    }

    /// Live subscribers.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Ingestion pipeline.
    pub fn pipeline(&self) -> &Arc<IngestionPipeline> {
        &self.pipeline
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// A running listener.
pub struct ServerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    /// Bound address (resolves port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the listener to stop after shutdown is signalled.
    pub async fn join(self) -> std::io::Result<()> {
        self.task.await.map_err(std::io::Error::other)?
    }
}

/// POST /location
async fn ingest_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            metrics::counter!(INGEST_REQUESTS_TOTAL, "outcome" => "rejected").increment(1);
            return rejection.into_response();
        }
    };

    match state.pipeline.ingest(&body) {
        Ok(_) => {
            metrics::counter!(INGEST_REQUESTS_TOTAL, "outcome" => "accepted").increment(1);
            (StatusCode::OK, "ok").into_response()
        }
        Err(e) => {
            metrics::counter!(INGEST_REQUESTS_TOTAL, "outcome" => e.outcome()).increment(1);
            warn!(error = %e, "rejected location payload");
            e.into_response()
        }
    }
}

/// GET /ws
async fn ws_handler(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            metrics::counter!(WS_UPGRADE_FAILURES_TOTAL).increment(1);
            warn!(error = %rejection, "websocket upgrade rejected");
            return rejection.into_response();
        }
    };

    upgrade
        .on_failed_upgrade(|error| {
            metrics::counter!(WS_UPGRADE_FAILURES_TOTAL).increment(1);
            warn!(%error, "websocket upgrade failed");
        })
        .on_upgrade(move |socket| async move {
            let _ = state.lifecycle.run(socket).await;
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.len(),
        state.pipeline.in_flight(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
