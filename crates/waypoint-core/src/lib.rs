//! # waypoint-core
//!
//! Shared building blocks for the Waypoint location tracker:
//!
//! - [`LocationReport`]: the immutable, server-stamped record fanned out to
//!   subscribers and persisted
//! - [`PayloadSchema`]: the wire vocabulary (field names) publishers and
//!   subscribers speak, with strict decoding into [`LocationUpdate`]
//! - [`Clock`]: the authority for ingestion timestamps
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod clock;
pub mod location;
pub mod logging;
pub mod schema;

pub use clock::{Clock, FixedClock, SystemClock};
pub use location::{LocationReport, LocationUpdate};
pub use schema::{DecodeError, PayloadSchema};
