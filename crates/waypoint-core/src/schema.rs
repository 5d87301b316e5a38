//! Payload schemas: the field names publishers send and subscribers receive.
//!
//! Field operators in the wild speak slightly different dialects of the same
//! JSON object. Rather than one program per dialect, the dialect is a
//! configuration choice:
//!
//! | Schema    | Subject key       | Correlation key |
//! |-----------|-------------------|-----------------|
//! | `subject` | `subjectId`       | `orderId`       |
//! | `courier` | `delivery_man_id` | `order_id`      |
//! | `device`  | `phone_id`        | (none)          |
//!
//! All schemas share `latitude`, `longitude` and `timestamp`. An inbound
//! `timestamp` is always ignored.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::location::{LocationReport, LocationUpdate};

const LATITUDE: &str = "latitude";
const LONGITUDE: &str = "longitude";

/// Why a publisher payload was rejected.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Body is not valid JSON.
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Body is valid JSON but not an object.
    #[error("payload must be a JSON object")]
    NotAnObject,

    /// A field has the wrong JSON type.
    #[error("invalid payload: {0}")]
    WrongType(serde_json::Error),

    /// A required field is absent or null.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field is present with an unusable value.
    #[error("invalid field {field}: expected {expected}")]
    InvalidField {
        /// Wire name of the offending field.
        field: &'static str,
        /// What the decoder accepts.
        expected: &'static str,
    },
}

/// Wire dialect for location payloads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadSchema {
    /// `subjectId` / `orderId`.
    #[default]
    Subject,
    /// `delivery_man_id` / `order_id`.
    Courier,
    /// `phone_id`, no correlation id.
    Device,
}

impl PayloadSchema {
    /// Wire name of the subject identifier.
    pub fn subject_key(self) -> &'static str {
        match self {
            Self::Subject => SubjectPayload::SUBJECT_KEY,
            Self::Courier => CourierPayload::SUBJECT_KEY,
            Self::Device => DevicePayload::SUBJECT_KEY,
        }
    }

    /// Wire name of the correlation id, if this schema carries one.
    pub fn order_key(self) -> Option<&'static str> {
        match self {
            Self::Subject => Some("orderId"),
            Self::Courier => Some("order_id"),
            Self::Device => None,
        }
    }

    /// Decode a publisher body.
    ///
    /// The subject id must be a non-empty string and both coordinates must
    /// be JSON numbers. Unknown fields, including `timestamp`, are ignored.
    pub fn decode(self, raw: &[u8]) -> Result<LocationUpdate, DecodeError> {
        let value: Value = serde_json::from_slice(raw)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject);
        }
        match self {
            Self::Subject => decode_as::<SubjectPayload>(value),
            Self::Courier => decode_as::<CourierPayload>(value),
            Self::Device => decode_as::<DevicePayload>(value),
        }
    }

    /// Encode a stamped report for subscribers.
    pub fn encode(self, report: &LocationReport) -> Result<String, serde_json::Error> {
        match self {
            Self::Subject => serde_json::to_string(&SubjectPayload::from_report(report)),
            Self::Courier => serde_json::to_string(&CourierPayload::from_report(report)),
            Self::Device => serde_json::to_string(&DevicePayload::from_report(report)),
        }
    }
}

impl fmt::Display for PayloadSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Subject => "subject",
            Self::Courier => "courier",
            Self::Device => "device",
        })
    }
}

impl FromStr for PayloadSchema {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "subject" => Ok(Self::Subject),
            "courier" => Ok(Self::Courier),
            "device" => Ok(Self::Device),
            other => Err(format!("unknown payload schema: {other}")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

/// One schema's JSON shape.
///
/// Fields are optional on the way in so absence surfaces as
/// [`DecodeError::MissingField`]; `timestamp` is only ever written.
trait WirePayload: DeserializeOwned + Serialize {
    const SUBJECT_KEY: &'static str;

    fn into_fields(self) -> WireFields;

    fn from_report(report: &LocationReport) -> Self;
}

struct WireFields {
    subject_id: Option<String>,
    order_id: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubjectPayload {
    subject_id: Option<String>,
    order_id: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(skip_deserializing)]
    timestamp: Option<i64>,
}

impl WirePayload for SubjectPayload {
    const SUBJECT_KEY: &'static str = "subjectId";

    fn into_fields(self) -> WireFields {
        WireFields {
            subject_id: self.subject_id,
            order_id: self.order_id,
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    fn from_report(report: &LocationReport) -> Self {
        Self {
            subject_id: Some(report.subject_id().to_string()),
            order_id: Some(report.order_id().to_string()),
            latitude: Some(report.latitude()),
            longitude: Some(report.longitude()),
            timestamp: Some(report.timestamp()),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CourierPayload {
    delivery_man_id: Option<String>,
    order_id: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(skip_deserializing)]
    timestamp: Option<i64>,
}

impl WirePayload for CourierPayload {
    const SUBJECT_KEY: &'static str = "delivery_man_id";

    fn into_fields(self) -> WireFields {
        WireFields {
            subject_id: self.delivery_man_id,
            order_id: self.order_id,
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    fn from_report(report: &LocationReport) -> Self {
        Self {
            delivery_man_id: Some(report.subject_id().to_string()),
            order_id: Some(report.order_id().to_string()),
            latitude: Some(report.latitude()),
            longitude: Some(report.longitude()),
            timestamp: Some(report.timestamp()),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct DevicePayload {
    phone_id: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(skip_deserializing)]
    timestamp: Option<i64>,
}

impl WirePayload for DevicePayload {
    const SUBJECT_KEY: &'static str = "phone_id";

    fn into_fields(self) -> WireFields {
        WireFields {
            subject_id: self.phone_id,
            order_id: None,
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    fn from_report(report: &LocationReport) -> Self {
        Self {
            phone_id: Some(report.subject_id().to_string()),
            latitude: Some(report.latitude()),
            longitude: Some(report.longitude()),
            timestamp: Some(report.timestamp()),
        }
    }
}

fn decode_as<W: WirePayload>(value: Value) -> Result<LocationUpdate, DecodeError> {
    let fields = serde_json::from_value::<W>(value)
        .map_err(DecodeError::WrongType)?
        .into_fields();

    let subject_id = fields
        .subject_id
        .ok_or(DecodeError::MissingField(W::SUBJECT_KEY))?;
    if subject_id.trim().is_empty() {
        return Err(DecodeError::InvalidField {
            field: W::SUBJECT_KEY,
            expected: "non-empty string",
        });
    }

    Ok(LocationUpdate {
        subject_id,
        order_id: fields.order_id.unwrap_or_default(),
        latitude: fields.latitude.ok_or(DecodeError::MissingField(LATITUDE))?,
        longitude: fields.longitude.ok_or(DecodeError::MissingField(LONGITUDE))?,
    })
}
