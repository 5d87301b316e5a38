//! Fan-out of location reports to every registered subscriber.

use std::sync::Arc;

use tracing::{debug, warn};
use waypoint_core::{LocationReport, PayloadSchema};

use super::connection::DeliveryError;
use super::registry::ConnectionRegistry;
use crate::metrics::{BROADCAST_DELIVERIES_TOTAL, BROADCAST_EVICTIONS_TOTAL};

/// Outcome of one [`Broadcaster::publish`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Connections in the snapshot.
    pub recipients: usize,
    /// Connections the payload was queued to.
    pub delivered: usize,
    /// Connections evicted during this pass.
    pub evicted: usize,
}

/// Serializes reports once and offers the payload to every subscriber.
///
/// Offers never wait: a closed or full queue evicts that subscriber and the
/// pass continues with the rest.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    schema: PayloadSchema,
}

impl Broadcaster {
    /// Create a broadcaster over `registry` speaking `schema`.
    pub fn new(registry: Arc<ConnectionRegistry>, schema: PayloadSchema) -> Self {
        Self { registry, schema }
    }

    /// Encode `report` and deliver it to the current subscribers.
    pub fn publish(&self, report: &LocationReport) -> PublishReport {
        match self.schema.encode(report) {
            Ok(json) => self.publish_payload(Arc::from(json)),
            Err(e) => {
                warn!(subject_id = report.subject_id(), error = %e, "failed to encode report");
                PublishReport::default()
            }
        }
    }

    /// Deliver an already encoded payload; every subscriber gets the same
    /// allocation.
    pub fn publish_payload(&self, payload: Arc<str>) -> PublishReport {
        let snapshot = self.registry.snapshot();
        let mut report = PublishReport {
            recipients: snapshot.len(),
            ..PublishReport::default()
        };

        for conn in &snapshot {
            match conn.offer(Arc::clone(&payload)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    if self.evict(conn.id(), e) {
                        report.evicted += 1;
                    }
                }
            }
        }

        if report.delivered > 0 {
            metrics::counter!(BROADCAST_DELIVERIES_TOTAL).increment(report.delivered as u64);
        }
        debug!(
            recipients = report.recipients,
            delivered = report.delivered,
            evicted = report.evicted,
            "broadcast location"
        );
        report
    }

    /// Remove a subscriber after a failed delivery. Returns whether this call
    /// performed the removal.
    pub fn evict(&self, conn_id: &str, error: DeliveryError) -> bool {
        if !self.registry.remove(conn_id) {
            return false;
        }
        warn!(conn_id, reason = error.reason(), "evicting subscriber");
        metrics::counter!(BROADCAST_EVICTIONS_TOTAL, "reason" => error.reason()).increment(1);
        true
    }

    /// Registry this broadcaster reads from.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}
