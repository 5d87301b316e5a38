//! Membership of live subscribers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::connection::SubscriberConnection;
use crate::metrics::WS_CONNECTIONS_ACTIVE;

/// Set of registered subscribers.
///
/// The lock is held only to mutate or copy the map, never across I/O.
/// Broadcasts iterate a [`snapshot`](Self::snapshot), so concurrent adds and
/// removes only affect later passes.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, Arc<SubscriberConnection>>>,
    count: AtomicUsize,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns `false` if it was already present or
    /// has already been removed.
    pub fn add(&self, connection: Arc<SubscriberConnection>) -> bool {
        if connection.is_removed() {
            return false;
        }
        let mut conns = self.connections.lock();
        if conns.contains_key(connection.id()) {
            return false;
        }
        let _ = conns.insert(connection.id().to_string(), connection);
        self.record_len(conns.len());
        true
    }

    /// Remove a connection and signal its close. Returns whether it was
    /// registered; removing twice is harmless.
    pub fn remove(&self, id: &str) -> bool {
        let (removed, len) = {
            let mut conns = self.connections.lock();
            let removed = conns.remove(id);
            if removed.is_some() {
                self.record_len(conns.len());
            }
            (removed, conns.len())
        };
        let Some(connection) = removed else {
            return false;
        };
        let _ = connection.mark_removed();
        debug!(conn_id = id, remaining = len, "subscriber removed");
        true
    }

    // Caller holds the map lock, so count and gauge writes follow lock order.
    fn record_len(&self, len: usize) {
        self.count.store(len, Ordering::Release);
        metrics::gauge!(WS_CONNECTIONS_ACTIVE).set(len as f64);
    }

    /// Copy of the live connections.
    pub fn snapshot(&self) -> Vec<Arc<SubscriberConnection>> {
        self.connections.lock().values().cloned().collect()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.connections.lock().contains_key(id)
    }

    /// Registered connection count.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
