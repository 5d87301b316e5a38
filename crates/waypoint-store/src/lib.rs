//! # waypoint-store
//!
//! Durable storage for location reports.
//!
//! The store is append-only: the ingestion pipeline writes each stamped
//! report through a [`Persister`], and nothing in the service reads it back.
//! The repository's read methods exist for operators and tests.
//!
//! Only `SQLite` is built in. Connection strings are parsed by
//! [`sqlite::DatabaseUrl`]; unknown schemes fail with
//! [`StoreError::UnsupportedBackend`].

#![deny(unsafe_code)]

pub mod errors;
pub mod persister;
pub mod sqlite;

pub use errors::{Result, StoreError};
pub use persister::{Persister, SqlitePersister};
pub use sqlite::ConnectionConfig;
pub use sqlite::repositories::{LocationRepo, StoredLocation};
