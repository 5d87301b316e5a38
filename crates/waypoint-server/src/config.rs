//! Server configuration.

use std::time::Duration;

use waypoint_core::PayloadSchema;
use waypoint_settings::WaypointSettings;

/// Runtime configuration for [`WaypointServer`](crate::server::WaypointServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (`0` auto-assigns).
    pub port: u16,
    /// Largest accepted ingestion body in bytes.
    pub max_body_bytes: usize,
    /// WebSocket ping period; `None` disables pings.
    pub heartbeat_interval: Option<Duration>,
    /// Deadline for one socket write to a subscriber.
    pub send_timeout: Duration,
    /// Per-subscriber outbound queue capacity.
    pub queue_capacity: usize,
    /// Maximum records dispatched but not yet persisted and broadcast.
    pub max_in_flight: usize,
    /// Wire dialect for inbound and outbound payloads.
    pub payload_schema: PayloadSchema,
    /// How long shutdown waits for in-flight dispatch.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&WaypointSettings::default())
    }
}

impl From<&WaypointSettings> for ServerConfig {
    fn from(settings: &WaypointSettings) -> Self {
        let heartbeat = settings.server.heartbeat_interval_secs;
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_body_bytes: settings.server.max_body_bytes,
            heartbeat_interval: (heartbeat > 0).then(|| Duration::from_secs(heartbeat)),
            send_timeout: Duration::from_millis(settings.broadcast.send_timeout_ms),
            queue_capacity: settings.broadcast.queue_capacity.max(1),
            max_in_flight: settings.ingest.max_in_flight.max(1),
            payload_schema: settings.ingest.payload_schema,
            shutdown_timeout: Duration::from_secs(settings.server.shutdown_timeout_secs),
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
