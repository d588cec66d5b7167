//! Persistence for consumed telemetry.
//!
//! The consumer loop hands every batch to a [`RecordSink`] after stamping it
//! with the consumption time. Two sinks are provided:
//!
//! - [`CsvSink`]: delimited text, `time_ms;drone_index;x;y;z`, with a
//!   configurable decimal separator and fixed precision.
//! - [`SqliteSink`]: a `points` table in a `SQLite` database.
//!
//! Persistence is best-effort: a failed append is reported by the consumer
//! and ingestion carries on.

pub mod csv;
mod migrations;
mod schema;
pub mod sqlite;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::protocol::PointRecord;
use crate::window::EntityId;

pub use self::csv::{CsvSink, RecordFormat, CSV_COLUMNS, TIME_FORMAT};
pub use self::sqlite::SqliteSink;

/// Which sink the consumer writes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Delimited text file.
    #[default]
    Csv,
    /// `SQLite` database.
    Sqlite,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// One point as it is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedRecord {
    /// Wall-clock time at which the consumer processed the batch.
    pub time: DateTime<Local>,
    /// 1-based position of the point within its batch.
    pub drone_index: EntityId,
    /// The point itself.
    pub point: PointRecord,
}

/// Destination for consumed records.
pub trait RecordSink: Send + std::fmt::Debug {
    /// Append one batch of records, preserving their order.
    ///
    /// # Errors
    ///
    /// Returns an error if the records could not be written.
    fn append(&mut self, records: &[PersistedRecord]) -> Result<()>;

    /// Flush any buffered output.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> Result<()>;
}

/// Open the sink selected by the storage configuration.
///
/// # Errors
///
/// Returns an error if the output file or database cannot be created.
pub fn open_sink(config: &Config) -> Result<Box<dyn RecordSink>> {
    let path = config.output_path();
    info!(backend = %config.storage.backend, path = %path.display(), "opening record sink");

    match config.storage.backend {
        StorageBackend::Csv => Ok(Box::new(CsvSink::create(path, config.record_format())?)),
        StorageBackend::Sqlite => Ok(Box::new(SqliteSink::open(path)?)),
    }
}
