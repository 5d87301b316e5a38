//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered WebSocket subscribers.
    pub subscribers: usize,
    /// Records whose persist/broadcast has not finished.
    pub in_flight: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, subscribers: usize, in_flight: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        subscribers,
        in_flight,
    }
}
