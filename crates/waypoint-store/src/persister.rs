//! Durable sink for ingested reports.
//!
//! [`Persister`] is the seam the ingestion pipeline writes through; the
//! `SQLite` implementation runs each insert on the blocking pool so a slow
//! disk never stalls the async runtime.

use async_trait::async_trait;
use tracing::debug;
use waypoint_core::LocationReport;

use crate::errors::{Result, StoreError};
use crate::sqlite::repositories::LocationRepo;
use crate::sqlite::{ConnectionConfig, ConnectionPool, open, run_migrations};

/// Appends location reports to durable storage.
#[async_trait]
pub trait Persister: Send + Sync {
    /// Persist one report. Returns the storage-assigned row id.
    async fn save(&self, report: &LocationReport) -> Result<i64>;
}

/// `SQLite`-backed [`Persister`].
#[derive(Clone)]
pub struct SqlitePersister {
    pool: ConnectionPool,
}

impl SqlitePersister {
    /// Wrap an existing pool. The schema must already be migrated.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Open the database named by `url` and bring its schema up to date.
    pub fn open(url: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = open(url, config)?;
        {
            let conn = pool.get()?;
            let applied = run_migrations(&conn)?;
            debug!(applied, "location schema ready");
        }
        Ok(Self { pool })
    }

    /// Underlying pool, for read-side queries.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

#[async_trait]
impl Persister for SqlitePersister {
    async fn save(&self, report: &LocationReport) -> Result<i64> {
        let pool = self.pool.clone();
        let report = report.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            LocationRepo::insert(&conn, &report)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("persist task failed: {e}")))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
