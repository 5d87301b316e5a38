//! Ingestion pipeline.
//!
//! `ingest` decodes a publisher body, stamps it with the server clock and
//! hands the resulting report to two independent sinks (persistence and
//! broadcast), each on its own tracked task. The caller gets the report back
//! as soon as both tasks are spawned.
//!
//! Outstanding dispatch is bounded by a semaphore. When every permit is held,
//! `ingest` fails fast with [`IngestError::Overloaded`] instead of queuing.

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};
use waypoint_core::{Clock, DecodeError, LocationReport, PayloadSchema};
use waypoint_store::Persister;

use crate::metrics::{DISPATCH_IN_FLIGHT, PERSIST_DURATION_SECONDS, PERSIST_FAILURES_TOTAL};
use crate::websocket::Broadcaster;

/// Why an ingestion request was refused.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Body could not be decoded into a location.
    #[error("malformed location payload: {0}")]
    Malformed(#[from] DecodeError),

    /// Dispatch capacity is exhausted.
    #[error("dispatch capacity exhausted, retry later")]
    Overloaded,
}

impl IngestError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Metric label for this error.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::Overloaded => "overloaded",
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// A dispatch permit shared by the persist and publish tasks of one report.
struct DispatchPermit {
    _permit: OwnedSemaphorePermit,
}

impl DispatchPermit {
    fn new(permit: OwnedSemaphorePermit) -> Self {
        metrics::gauge!(DISPATCH_IN_FLIGHT).increment(1.0);
        Self { _permit: permit }
    }
}

impl Drop for DispatchPermit {
    fn drop(&mut self) {
        metrics::gauge!(DISPATCH_IN_FLIGHT).decrement(1.0);
    }
}

/// Decodes, stamps and fans out publisher reports.
pub struct IngestionPipeline {
    schema: PayloadSchema,
    clock: Arc<dyn Clock>,
    persister: Arc<dyn Persister>,
    broadcaster: Arc<Broadcaster>,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
}

impl IngestionPipeline {
    /// Create a pipeline allowing `max_in_flight` concurrently dispatched reports.
    pub fn new(
        schema: PayloadSchema,
        clock: Arc<dyn Clock>,
        persister: Arc<dyn Persister>,
        broadcaster: Arc<Broadcaster>,
        max_in_flight: usize,
    ) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            schema,
            clock,
            persister,
            broadcaster,
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
        }
    }

    /// Accept one publisher body.
    ///
    /// Fails without side effects on malformed input or exhausted capacity.
    /// Any publisher-supplied timestamp is replaced by the pipeline clock.
    pub fn ingest(&self, raw: &[u8]) -> Result<Arc<LocationReport>, IngestError> {
        let update = self.schema.decode(raw)?;
        let permit = Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| IngestError::Overloaded)?;
        let permit = Arc::new(DispatchPermit::new(permit));

        let report = Arc::new(update.stamp(self.clock.now_unix()));
        debug!(
            subject_id = report.subject_id(),
            order_id = report.order_id(),
            timestamp = report.timestamp(),
            "location accepted"
        );

        self.spawn_persist(Arc::clone(&report), Arc::clone(&permit));
        self.spawn_publish(Arc::clone(&report), permit);
        Ok(report)
    }

    fn spawn_persist(&self, report: Arc<LocationReport>, permit: Arc<DispatchPermit>) {
        let persister = Arc::clone(&self.persister);
        let _ = self.tracker.spawn(async move {
            let _permit = permit;
            let started = Instant::now();
            match persister.save(&report).await {
                Ok(id) => debug!(id, subject_id = report.subject_id(), "location persisted"),
                Err(e) => {
                    metrics::counter!(PERSIST_FAILURES_TOTAL).increment(1);
                    warn!(subject_id = report.subject_id(), error = %e, "failed to persist location");
                }
            }
            metrics::histogram!(PERSIST_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        });
    }

    fn spawn_publish(&self, report: Arc<LocationReport>, permit: Arc<DispatchPermit>) {
        let broadcaster = Arc::clone(&self.broadcaster);
        let _ = self.tracker.spawn(async move {
            let _permit = permit;
            let _ = broadcaster.publish(&report);
        });
    }

    /// Reports whose persist or publish task has not finished.
    pub fn in_flight(&self) -> usize {
        self.max_in_flight
            .saturating_sub(self.permits.available_permits())
    }

    /// Tracker owning every dispatch task, for draining at shutdown.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Payload schema used for decoding.
    pub fn schema(&self) -> PayloadSchema {
        self.schema
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
