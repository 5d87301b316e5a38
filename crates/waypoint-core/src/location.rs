//! Location records.

/// A decoded publisher payload that has not been stamped yet.
///
/// Any timestamp the publisher sent has already been discarded by the
/// decoder; the only way to obtain a [`LocationReport`] is [`Self::stamp`].
#[derive(Clone, Debug, PartialEq)]
pub struct LocationUpdate {
    /// Reporting device or courier.
    pub subject_id: String,
    /// Correlated order/task, empty when absent.
    pub order_id: String,
    /// Latitude in signed degrees.
    pub latitude: f64,
    /// Longitude in signed degrees.
    pub longitude: f64,
}

impl LocationUpdate {
    /// Attach the server-assigned timestamp (unix seconds).
    pub fn stamp(self, timestamp: i64) -> LocationReport {
        LocationReport {
            subject_id: self.subject_id,
            order_id: self.order_id,
            latitude: self.latitude,
            longitude: self.longitude,
            timestamp,
        }
    }
}

/// An ingested location, immutable once stamped.
///
/// Fields are private so a report cannot be altered after the pipeline
/// stamped it; sinks receive it behind an `Arc`.
#[derive(Clone, Debug, PartialEq)]
pub struct LocationReport {
    subject_id: String,
    order_id: String,
    latitude: f64,
    longitude: f64,
    timestamp: i64,
}

impl LocationReport {
    /// Reporting device or courier.
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Correlated order/task, empty when absent.
    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    /// Latitude in signed degrees.
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in signed degrees.
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Server-assigned unix seconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}
