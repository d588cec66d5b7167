//! `SQLite` record sink.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tracing::{debug, info};

use super::migrations;
use super::schema::INSERT_POINT;
use super::{PersistedRecord, RecordSink};
use crate::error::{Error, Result};
use crate::protocol::PointRecord;
use crate::window::EntityId;

/// Persists records into a `points` table.
///
/// Each batch is written inside one transaction, so a batch is either
/// fully stored or not at all.
#[derive(Debug)]
pub struct SqliteSink {
    path: PathBuf,
    conn: Connection,
}

impl SqliteSink {
    /// Open or create a database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!(path = %path.display(), "opening database");
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!(path = %path.display(), "database opened");
        Ok(Self { path, conn })
    }

    /// Create an in-memory sink for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total number of stored points.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM points", [], |row| row.get(0))?;
        Ok(count)
    }

    /// The most recent `limit` points of one drone, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn track(&self, drone_index: EntityId, limit: usize) -> Result<Vec<PointRecord>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT x, y, z, w FROM (
                SELECT id, x, y, z, w FROM points
                WHERE drone_index = ?1
                ORDER BY id DESC LIMIT ?2
            ) ORDER BY id ASC
            ",
        )?;

        let index = i64::try_from(drone_index).unwrap_or(i64::MAX);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let points = stmt
            .query_map(params![index, limit], |row| {
                Ok(PointRecord {
                    x: row.get(0)?,
                    y: row.get(1)?,
                    z: row.get(2)?,
                    w: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(points)
    }
}

impl RecordSink for SqliteSink {
    fn append(&mut self, records: &[PersistedRecord]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(INSERT_POINT)?;
            for record in records {
                stmt.execute(params![
                    record.time.to_rfc3339(),
                    i64::try_from(record.drone_index).unwrap_or(i64::MAX),
                    record.point.x,
                    record.point.y,
                    record.point.z,
                    record.point.w,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Local;

    use super::*;

    fn record(index: EntityId, point: PointRecord) -> PersistedRecord {
        PersistedRecord {
            time: Local::now(),
            drone_index: index,
            point,
        }
    }

    #[test]
    fn test_open_in_memory() {
        let sink = SqliteSink::open_in_memory().unwrap();
        assert_eq!(sink.count().unwrap(), 0);
        assert_eq!(sink.path().to_string_lossy(), ":memory:");
    }

    #[test]
    fn test_append_and_track() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        sink.append(&[
            record(1, PointRecord::new(1.0, 1.0, 1.0)),
            record(2, PointRecord::new(2.0, 2.0, 2.0)),
        ])
        .unwrap();
        sink.append(&[record(1, PointRecord::new(3.0, 3.0, 3.0))])
            .unwrap();

        assert_eq!(sink.count().unwrap(), 3);
        let track = sink.track(1, 10).unwrap();
        assert_eq!(
            track,
            vec![PointRecord::new(1.0, 1.0, 1.0), PointRecord::new(3.0, 3.0, 3.0)]
        );
    }

    #[test]
    fn test_track_limit_keeps_most_recent() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        for i in 0..5 {
            sink.append(&[record(1, PointRecord::new(f64::from(i), 0.0, 0.0))])
                .unwrap();
        }

        let xs: Vec<f64> = sink.track(1, 2).unwrap().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![3.0, 4.0]);
    }

    #[test]
    fn test_optional_w_channel_round_trips() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        let with_w = PointRecord {
            w: Some(0.5),
            ..PointRecord::new(1.0, 2.0, 3.0)
        };
        sink.append(&[record(1, with_w), record(2, PointRecord::new(4.0, 5.0, 6.0))])
            .unwrap();

        assert_eq!(sink.track(1, 1).unwrap()[0].w, Some(0.5));
        assert_eq!(sink.track(2, 1).unwrap()[0].w, None);
    }

    #[test]
    fn test_open_file_based() {
        let db_path = std::env::temp_dir().join(format!(
            "dronelink_sqlite_test_{}.db",
            std::process::id()
        ));

        {
            let mut sink = SqliteSink::open(&db_path).unwrap();
            sink.append(&[record(1, PointRecord::new(1.0, 2.0, 3.0))])
                .unwrap();
        }

        let sink = SqliteSink::open(&db_path).unwrap();
        assert_eq!(sink.count().unwrap(), 1);
        drop(sink);

        let _ = std::fs::remove_file(&db_path);
        let _ = std::fs::remove_file(db_path.with_extension("db-wal"));
        let _ = std::fs::remove_file(db_path.with_extension("db-shm"));
    }
}
