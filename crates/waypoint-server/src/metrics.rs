//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Returns the handle used to render `/metrics`. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Ingestion requests (counter, labels: outcome).
pub const INGEST_REQUESTS_TOTAL: &str = "ingest_requests_total";
/// Records dispatched but not yet fully persisted and broadcast (gauge).
pub const DISPATCH_IN_FLIGHT: &str = "dispatch_in_flight";
/// Failed persistence attempts (counter).
pub const PERSIST_FAILURES_TOTAL: &str = "persist_failures_total";
/// Persistence latency (histogram).
pub const PERSIST_DURATION_SECONDS: &str = "persist_duration_seconds";
/// Payloads queued to subscribers (counter).
pub const BROADCAST_DELIVERIES_TOTAL: &str = "broadcast_deliveries_total";
/// Subscribers evicted for failed delivery (counter, labels: reason).
pub const BROADCAST_EVICTIONS_TOTAL: &str = "broadcast_evictions_total";
/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Registered subscribers (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Rejected WebSocket upgrades (counter).
pub const WS_UPGRADE_FAILURES_TOTAL: &str = "ws_upgrade_failures_total";
/// Subscriber connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
