//! `SQLite` backend.
//!
//! - **[`connection`]**: URL parsing and the `r2d2` pool with per-connection pragmas.
//! - **[`migrations`]**: version-tracked schema, embedded at compile time.
//! - **[`repositories`]**: stateless SQL over a borrowed connection.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{
    ConnectionConfig, ConnectionPool, DatabaseUrl, PooledConnection, journal_mode, new_file,
    new_in_memory, open,
};
pub use migrations::{current_version, latest_version, run_migrations};
