//! # waypointd
//!
//! Waypoint daemon: loads settings, opens the location store and serves
//! ingestion and subscriber endpoints until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use waypoint_core::PayloadSchema;
use waypoint_settings::WaypointSettings;
use waypoint_store::{ConnectionConfig, SqlitePersister};
use waypoint_server::{ServerConfig, WaypointServer};

/// Waypoint live location tracker.
#[derive(Parser, Debug)]
#[command(name = "waypointd", about = "Live location ingestion and WebSocket fan-out")]
struct Cli {
    /// Settings file (default `~/.waypoint/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Database connection string, e.g. `sqlite:///var/lib/waypoint/locations.db`.
    #[arg(long)]
    database_url: Option<String>,

    /// Payload field naming: `subject`, `courier` or `device`.
    #[arg(long)]
    schema: Option<PayloadSchema>,

    /// Log filter when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Command-line flags win over file and environment settings.
    fn apply(&self, settings: &mut WaypointSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(url) = &self.database_url {
            settings.storage.database_url.clone_from(url);
        }
        if let Some(schema) = self.schema {
            settings.ingest.payload_schema = schema;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }

    fn load_settings(&self) -> Result<WaypointSettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(waypoint_settings::settings_path);
        let mut settings = waypoint_settings::load_settings_from_path(&path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        self.apply(&mut settings);
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    waypoint_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);
    let metrics = waypoint_server::metrics::install_recorder()
        .context("failed to install metrics recorder")?;

    let store = SqlitePersister::open(
        &settings.storage.database_url,
        &ConnectionConfig {
            pool_size: settings.storage.pool_size,
            busy_timeout_ms: settings.storage.busy_timeout_ms,
        },
    )
    .with_context(|| format!("failed to open database {}", settings.storage.database_url))?;

    let config = ServerConfig::from(&settings);
    let shutdown_timeout = config.shutdown_timeout;
    let server = WaypointServer::new(config, Arc::new(store)).with_metrics(metrics);
    let handle = server.listen().await.context("failed to bind server")?;

    info!(
        "waypoint listening on http://{} (schema: {})",
        handle.local_addr(),
        settings.ingest.payload_schema
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("shutting down");
    server.shutdown().shutdown();
    handle.join().await.context("server terminated with an error")?;
    let drained = server
        .shutdown()
        .graceful_shutdown(server.pipeline().tracker(), shutdown_timeout)
        .await;

    info!(drained, "shutdown complete");
    Ok(())
}
