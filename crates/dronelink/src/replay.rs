//! Offline replay of a persisted CSV file through the sliding windows.
//!
//! Rows are applied in file order. After every row the windows are
//! snapshotted into a [`PlotFrame`], exactly as the live viewer would see
//! them.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::PointRecord;
use crate::storage::{RecordFormat, CSV_COLUMNS};
use crate::viewer::PlotFrame;
use crate::window::{EntityId, WindowSet};

/// One parsed data line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayRow {
    /// 1-based line number in the source.
    pub line: usize,
    /// Drone the point belongs to.
    pub drone_index: EntityId,
    /// The stored point.
    pub point: PointRecord,
}

/// Parse CSV text into rows, skipping the header and blank lines.
///
/// # Errors
///
/// Returns [`Error::Replay`] naming the first line that does not parse.
pub fn parse_rows(text: &str, format: &RecordFormat) -> Result<Vec<ReplayRow>> {
    let mut rows = Vec::new();

    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || (i == 0 && line.starts_with(CSV_COLUMNS[0])) {
            continue;
        }

        let (drone_index, point) = format
            .parse_record(line)
            .map_err(|message| Error::replay(line_no, message))?;
        rows.push(ReplayRow {
            line: line_no,
            drone_index,
            point,
        });
    }

    Ok(rows)
}

/// Read and parse a CSV file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read, or [`Error::Replay`]
/// for a malformed line.
pub fn read_rows(path: impl AsRef<Path>, format: &RecordFormat) -> Result<Vec<ReplayRow>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let rows = parse_rows(&text, format)?;
    debug!(path = %path.display(), rows = rows.len(), "loaded replay file");
    Ok(rows)
}

/// Feeds stored rows into a private window set.
#[derive(Debug)]
pub struct Replay {
    rows: Vec<ReplayRow>,
    position: usize,
    windows: WindowSet,
    capacity: usize,
    margin: f64,
    delay: Option<Duration>,
}

impl Replay {
    /// Replay `rows` into windows of `capacity` points.
    #[must_use]
    pub fn new(rows: Vec<ReplayRow>, capacity: usize, margin: f64) -> Self {
        Self {
            rows,
            position: 0,
            windows: WindowSet::new(),
            capacity,
            margin,
            delay: None,
        }
    }

    /// Pause for `delay` between rows in [`run`](Self::run).
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Rows not yet applied.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.len() - self.position
    }

    /// The windows as they stand.
    #[must_use]
    pub fn windows(&self) -> &WindowSet {
        &self.windows
    }

    /// Apply the next row and return the resulting frame.
    pub fn step(&mut self) -> Option<PlotFrame> {
        let row = self.rows.get(self.position)?;
        self.windows
            .update(row.drone_index, row.point.x, row.point.y, self.capacity);
        self.position += 1;
        Some(PlotFrame::capture(&self.windows, self.margin))
    }

    /// Apply every remaining row, handing each frame to `on_frame`.
    ///
    /// Returns the number of rows applied.
    pub async fn run<F>(&mut self, mut on_frame: F) -> usize
    where
        F: FnMut(&PlotFrame),
    {
        let mut applied = 0;
        while let Some(frame) = self.step() {
            on_frame(&frame);
            applied += 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }

        info!(rows = applied, drones = self.windows.len(), "replay finished");
        applied
    }
}
