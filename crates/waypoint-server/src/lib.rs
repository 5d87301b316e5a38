//! # waypoint-server
//!
//! Axum HTTP ingestion and WebSocket fan-out.
//!
//! - `POST /location` (alias `/update-location`): decode, stamp, then persist
//!   and broadcast concurrently
//! - `GET /ws`: subscriber stream of every accepted report
//! - `GET /health`, `GET /metrics`
//! - Graceful shutdown via [`ShutdownCoordinator`]

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod ingest;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use ingest::{IngestError, IngestionPipeline};
pub use server::{AppState, ServerHandle, WaypointServer};
pub use shutdown::ShutdownCoordinator;
pub use websocket::{Broadcaster, ConnectionRegistry, DeliveryError, PublishReport};
