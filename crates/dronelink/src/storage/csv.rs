//! Delimited-text record sink.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{PersistedRecord, RecordSink};
use crate::error::{Error, Result};
use crate::protocol::PointRecord;
use crate::window::EntityId;

/// Column names, in file order.
pub const CSV_COLUMNS: [&str; 5] = ["time_ms", "drone_index", "x", "y", "z"];

/// Timestamp layout of the `time_ms` column (local wall clock).
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// How numbers and fields are laid out in a record line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFormat {
    /// Separator between fields.
    pub field_separator: char,
    /// Decimal separator inside numbers.
    pub decimal_separator: char,
    /// Digits after the decimal separator.
    pub precision: usize,
}

impl Default for RecordFormat {
    fn default() -> Self {
        Self {
            field_separator: ';',
            decimal_separator: ',',
            precision: 6,
        }
    }
}

impl RecordFormat {
    /// The header line, without a trailing newline.
    #[must_use]
    pub fn header(&self) -> String {
        CSV_COLUMNS.join(&self.field_separator.to_string())
    }

    /// Format a number with fixed precision and the configured separator.
    #[must_use]
    pub fn format_number(&self, value: f64) -> String {
        let text = format!("{value:.prec$}", prec = self.precision);
        if self.decimal_separator == '.' {
            text
        } else {
            text.replace('.', &self.decimal_separator.to_string())
        }
    }

    /// Format one record as a line, without a trailing newline.
    #[must_use]
    pub fn format_record(&self, record: &PersistedRecord) -> String {
        let sep = self.field_separator;
        format!(
            "{time}{sep}{index}{sep}{x}{sep}{y}{sep}{z}",
            time = record.time.format(TIME_FORMAT),
            index = record.drone_index,
            x = self.format_number(record.point.x),
            y = self.format_number(record.point.y),
            z = self.format_number(record.point.z),
        )
    }

    /// Parse a number written by [`format_number`](Self::format_number).
    #[must_use]
    pub fn parse_number(&self, text: &str) -> Option<f64> {
        let text = text.trim();
        if self.decimal_separator == '.' {
            text.parse().ok()
        } else {
            text.replace(self.decimal_separator, ".").parse().ok()
        }
    }

    /// Parse a record line back into its drone and point.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the line does not have five
    /// fields or a field does not parse.
    pub fn parse_record(&self, line: &str) -> std::result::Result<(EntityId, PointRecord), String> {
        let fields: Vec<&str> = line.split(self.field_separator).collect();
        if fields.len() != CSV_COLUMNS.len() {
            return Err(format!(
                "expected {} fields, found {}",
                CSV_COLUMNS.len(),
                fields.len()
            ));
        }

        let drone_index: EntityId = fields[1]
            .trim()
            .parse()
            .map_err(|_| format!("invalid drone_index {:?}", fields[1]))?;
        let number = |i: usize| {
            self.parse_number(fields[i])
                .ok_or_else(|| format!("invalid {} {:?}", CSV_COLUMNS[i], fields[i]))
        };

        Ok((drone_index, PointRecord::new(number(2)?, number(3)?, number(4)?)))
    }
}

/// Writes records as delimited text.
///
/// The file is truncated on creation and starts with a header line.
/// Each appended batch is flushed so a crash loses at most the batch being
/// written.
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
    writer: BufWriter<File>,
    format: RecordFormat,
    lines_written: u64,
}

impl CsvSink {
    /// Create (or truncate) the file at `path` and write the header.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory or the file cannot be created.
    pub fn create(path: impl AsRef<Path>, format: RecordFormat) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "{}", format.header())?;
        writer.flush()?;

        debug!(path = %path.display(), "created record file");
        Ok(Self {
            path,
            writer,
            format,
            lines_written: 0,
        })
    }

    /// Path of the output file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of record lines written so far (header excluded).
    #[must_use]
    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }
}

impl RecordSink for CsvSink {
    fn append(&mut self, records: &[PersistedRecord]) -> Result<()> {
        for record in records {
            writeln!(self.writer, "{}", self.format.format_record(record))?;
            self.lines_written += 1;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};

    use super::*;

    fn record(index: EntityId, x: f64, y: f64, z: f64) -> PersistedRecord {
        PersistedRecord {
            time: Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap(),
            drone_index: index,
            point: PointRecord::new(x, y, z),
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dronelink_{name}_{}.csv", std::process::id()))
    }

    #[test]
    fn test_header_uses_field_separator() {
        assert_eq!(RecordFormat::default().header(), "time_ms;drone_index;x;y;z");
    }

    #[test]
    fn test_format_number_with_comma_decimal() {
        let format = RecordFormat::default();
        assert_eq!(format.format_number(1.5), "1,500000");
        assert_eq!(format.format_number(-2.25), "-2,250000");
        assert_eq!(format.format_number(12.345_678_9), "12,345679");
    }

    #[test]
    fn test_format_number_with_dot_decimal() {
        let format = RecordFormat {
            field_separator: ',',
            decimal_separator: '.',
            precision: 2,
        };
        assert_eq!(format.format_number(1.234_56), "1.23");
    }

    #[test]
    fn test_format_record() {
        let line = RecordFormat::default().format_record(&record(2, 1.0, -2.5, 30.0));
        assert_eq!(
            line,
            "2024-03-01 12:30:45.000000;2;1,000000;-2,500000;30,000000"
        );
    }

    #[test]
    fn test_parse_record_reverses_format() {
        let format = RecordFormat::default();
        let line = format.format_record(&record(3, 10.25, -7.5, 0.125));
        let (index, point) = format.parse_record(&line).unwrap();
        assert_eq!(index, 3);
        assert_eq!(point, PointRecord::new(10.25, -7.5, 0.125));
    }

    #[test]
    fn test_parse_record_errors() {
        let format = RecordFormat::default();
        assert!(format
            .parse_record("a;b;c")
            .unwrap_err()
            .contains("expected 5 fields"));
        assert!(format
            .parse_record("t;one;1,0;2,0;3,0")
            .unwrap_err()
            .contains("drone_index"));
        assert!(format
            .parse_record("t;1;1,0;oops;3,0")
            .unwrap_err()
            .contains("invalid y"));
    }

    #[test]
    fn test_sink_writes_header_and_records_in_order() {
        let path = temp_path("csv_sink");
        let mut sink = CsvSink::create(&path, RecordFormat::default()).unwrap();
        sink.append(&[record(1, 1.0, 1.0, 1.0), record(2, 2.0, 2.0, 2.0)])
            .unwrap();
        sink.append(&[record(1, 3.0, 3.0, 3.0)]).unwrap();
        assert_eq!(sink.lines_written(), 3);
        assert_eq!(sink.path(), path.as_path());

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "time_ms;drone_index;x;y;z");
        assert!(lines[1].contains(";1;1,000000;"));
        assert!(lines[2].contains(";2;2,000000;"));
        assert!(lines[3].contains(";1;3,000000;"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_sink_truncates_existing_file() {
        let path = temp_path("csv_truncate");
        std::fs::write(&path, "stale\nrows\n").unwrap();

        let sink = CsvSink::create(&path, RecordFormat::default()).unwrap();
        drop(sink);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "time_ms;drone_index;x;y;z\n");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_sink_creates_parent_directory() {
        let dir = std::env::temp_dir().join(format!("dronelink_csv_dir_{}", std::process::id()));
        let path = dir.join("nested").join("points.csv");

        let sink = CsvSink::create(&path, RecordFormat::default()).unwrap();
        drop(sink);
        assert!(path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
