//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file only needs the keys it changes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use waypoint_core::PayloadSchema;

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9090 },
///   "storage": { "databaseUrl": "sqlite:///var/lib/waypoint/locations.db" },
///   "ingest": { "payloadSchema": "courier" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaypointSettings {
    /// Network listener.
    pub server: ServerSettings,
    /// Persistence backend.
    pub storage: StorageSettings,
    /// Subscriber fan-out.
    pub broadcast: BroadcastSettings,
    /// Publisher ingestion.
    pub ingest: IngestSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Network listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (1-65535).
    pub port: u16,
    /// Largest accepted ingestion body.
    pub max_body_bytes: usize,
    /// WebSocket ping period; `0` disables pings.
    pub heartbeat_interval_secs: u64,
    /// How long shutdown waits for in-flight dispatch.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 16 * 1024,
            heartbeat_interval_secs: 30,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Persistence backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Connection string, e.g. `sqlite:///path/to/locations.db`.
    pub database_url: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// `SQLite` busy timeout.
    pub busy_timeout_ms: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_url: format!("sqlite://{}", default_database_path().display()),
            pool_size: 8,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Subscriber fan-out settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BroadcastSettings {
    /// Deadline for a single socket write before the subscriber is evicted.
    pub send_timeout_ms: u64,
    /// Per-subscriber outbound queue; overflow evicts.
    pub queue_capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            send_timeout_ms: 5_000,
            queue_capacity: 64,
        }
    }
}

/// Publisher ingestion settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngestSettings {
    /// Maximum records dispatched but not yet fully persisted/broadcast.
    pub max_in_flight: usize,
    /// Wire dialect for publishers and subscribers.
    pub payload_schema: PayloadSchema,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 1024,
            payload_schema: PayloadSchema::default(),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (`RUST_LOG` overrides).
    pub level: String,
    /// One JSON object per line.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// `~/.waypoint`, falling back to `/tmp/.waypoint` without `HOME`.
pub fn waypoint_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".waypoint")
}

fn default_database_path() -> PathBuf {
    waypoint_home().join("database").join("locations.db")
}
