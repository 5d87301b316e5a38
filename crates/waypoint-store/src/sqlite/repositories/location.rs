//! Location repository: append and read back rows of the `locations` table.

use rusqlite::{Connection, OptionalExtension, Row, params};
use waypoint_core::LocationReport;

use crate::errors::Result;

/// A persisted location row.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredLocation {
    /// Surrogate key.
    pub id: i64,
    /// Reporting device or courier.
    pub subject_id: String,
    /// Correlated order, empty when absent.
    pub order_id: String,
    /// Latitude in signed degrees.
    pub latitude: f64,
    /// Longitude in signed degrees.
    pub longitude: f64,
    /// Server-assigned unix seconds.
    pub timestamp: i64,
    /// Row insertion time (`SQLite` `datetime('now')`).
    pub created_at: String,
}

const COLUMNS: &str = "id, subject_id, order_id, latitude, longitude, timestamp, created_at";

/// Location repository.
pub struct LocationRepo;

impl LocationRepo {
    /// Append one report. Returns the new row id.
    pub fn insert(conn: &Connection, report: &LocationReport) -> Result<i64> {
        let _ = conn.execute(
            "INSERT INTO locations (subject_id, order_id, latitude, longitude, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                report.subject_id(),
                report.order_id(),
                report.latitude(),
                report.longitude(),
                report.timestamp()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Fetch one row by id.
    pub fn get(conn: &Connection, id: i64) -> Result<Option<StoredLocation>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM locations WHERE id = ?1"),
                params![id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Most recent row for a subject (by timestamp, then insertion order).
    pub fn latest_for_subject(
        conn: &Connection,
        subject_id: &str,
    ) -> Result<Option<StoredLocation>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM locations WHERE subject_id = ?1
                     ORDER BY timestamp DESC, id DESC LIMIT 1"
                ),
                params![subject_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Total rows.
    pub fn count(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM locations", [], |row| row.get(0))?)
    }

    /// Rows recorded for one subject.
    pub fn count_for_subject(conn: &Connection, subject_id: &str) -> Result<i64> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM locations WHERE subject_id = ?1",
            params![subject_id],
            |row| row.get(0),
        )?)
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<StoredLocation> {
        Ok(StoredLocation {
            id: row.get(0)?,
            subject_id: row.get(1)?,
            order_id: row.get(2)?,
            latitude: row.get(3)?,
            longitude: row.get(4)?,
            timestamp: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::run_migrations;
    use waypoint_core::LocationUpdate;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        let _ = run_migrations(&conn).unwrap();
        conn
    }

    fn report(subject: &str, order: &str, ts: i64) -> LocationReport {
        LocationUpdate {
            subject_id: subject.into(),
            order_id: order.into(),
            latitude: 52.52,
            longitude: 13.405,
        }
        .stamp(ts)
    }

    #[test]
    fn insert_and_get() {
        let conn = setup();
        let id = LocationRepo::insert(&conn, &report("c1", "o1", 100)).unwrap();
        let row = LocationRepo::get(&conn, id).unwrap().unwrap();
        assert_eq!(row.id, id);
        assert_eq!(row.subject_id, "c1");
        assert_eq!(row.order_id, "o1");
        assert!((row.latitude - 52.52).abs() < f64::EPSILON);
        assert!((row.longitude - 13.405).abs() < f64::EPSILON);
        assert_eq!(row.timestamp, 100);
        assert!(!row.created_at.is_empty());
    }

    #[test]
    fn get_missing_is_none() {
        let conn = setup();
        assert!(LocationRepo::get(&conn, 42).unwrap().is_none());
    }

    #[test]
    fn empty_order_is_stored_as_empty_string() {
        let conn = setup();
        let id = LocationRepo::insert(&conn, &report("phone-7", "", 1)).unwrap();
        assert_eq!(LocationRepo::get(&conn, id).unwrap().unwrap().order_id, "");
    }

    #[test]
    fn ids_are_monotonic() {
        let conn = setup();
        let a = LocationRepo::insert(&conn, &report("c1", "", 1)).unwrap();
        let b = LocationRepo::insert(&conn, &report("c1", "", 1)).unwrap();
        assert!(b > a);
    }

    #[test]
    fn counts() {
        let conn = setup();
        for ts in 0..3 {
            let _ = LocationRepo::insert(&conn, &report("c1", "", ts)).unwrap();
        }
        let _ = LocationRepo::insert(&conn, &report("c2", "", 0)).unwrap();
        assert_eq!(LocationRepo::count(&conn).unwrap(), 4);
        assert_eq!(LocationRepo::count_for_subject(&conn, "c1").unwrap(), 3);
        assert_eq!(LocationRepo::count_for_subject(&conn, "c3").unwrap(), 0);
    }

    #[test]
    fn latest_for_subject_orders_by_timestamp() {
        let conn = setup();
        let _ = LocationRepo::insert(&conn, &report("c1", "late", 200)).unwrap();
        let _ = LocationRepo::insert(&conn, &report("c1", "early", 100)).unwrap();
        let latest = LocationRepo::latest_for_subject(&conn, "c1").unwrap().unwrap();
        assert_eq!(latest.order_id, "late");
        assert!(LocationRepo::latest_for_subject(&conn, "nobody").unwrap().is_none());
    }
}
