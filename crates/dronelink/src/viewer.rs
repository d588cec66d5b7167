//! Periodic snapshots of the sliding windows for a plotting front end.
//!
//! The viewer never mutates windows. Each tick it copies every window and
//! computes axis bounds wide enough to hold all of them plus a margin.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ViewerConfig;
use crate::window::{EntityId, Point2, WindowSet};

/// Axis limits of a plot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotBounds {
    /// Left edge.
    pub x_min: f64,
    /// Right edge.
    pub x_max: f64,
    /// Bottom edge.
    pub y_min: f64,
    /// Top edge.
    pub y_max: f64,
}

impl PlotBounds {
    /// Bounds enclosing every point of every series, widened by `margin`.
    ///
    /// Returns `None` if there are no points.
    pub fn from_series<'a>(
        series: impl IntoIterator<Item = &'a [Point2]>,
        margin: f64,
    ) -> Option<Self> {
        let mut points = series.into_iter().flatten();
        let &(x, y) = points.next()?;
        let tight = points.fold(
            Self {
                x_min: x,
                x_max: x,
                y_min: y,
                y_max: y,
            },
            |b, &(x, y)| Self {
                x_min: b.x_min.min(x),
                x_max: b.x_max.max(x),
                y_min: b.y_min.min(y),
                y_max: b.y_max.max(y),
            },
        );

        Some(Self {
            x_min: tight.x_min - margin,
            x_max: tight.x_max + margin,
            y_min: tight.y_min - margin,
            y_max: tight.y_max + margin,
        })
    }

    /// Width of the x axis.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    /// Height of the y axis.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }
}

/// One rendered moment: a copy of every window and the axes to draw them on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlotFrame {
    /// Points per drone, oldest first.
    pub series: BTreeMap<EntityId, Vec<Point2>>,
    /// `None` until some drone has a point.
    pub bounds: Option<PlotBounds>,
}

impl PlotFrame {
    /// Snapshot `windows` and compute bounds.
    #[must_use]
    pub fn capture(windows: &WindowSet, margin: f64) -> Self {
        let series = windows.snapshot_all();
        let bounds = PlotBounds::from_series(series.values().map(Vec::as_slice), margin);
        Self { series, bounds }
    }

    /// Total number of points across all series.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    /// Most recent point of each drone.
    #[must_use]
    pub fn heads(&self) -> BTreeMap<EntityId, Point2> {
        self.series
            .iter()
            .filter_map(|(&id, points)| points.last().map(|&p| (id, p)))
            .collect()
    }
}

/// Polls the windows on a fixed interval.
#[derive(Debug)]
pub struct Viewer {
    windows: Arc<WindowSet>,
    interval: Duration,
    margin: f64,
}

impl Viewer {
    /// Create a viewer over `windows`.
    #[must_use]
    pub fn new(windows: Arc<WindowSet>, config: &ViewerConfig) -> Self {
        Self {
            windows,
            interval: config.update_interval(),
            margin: config.plot_margin,
        }
    }

    /// Capture a single frame now.
    #[must_use]
    pub fn frame(&self) -> PlotFrame {
        PlotFrame::capture(&self.windows, self.margin)
    }

    /// Hand a frame to `on_frame` every interval until `shutdown` fires.
    ///
    /// Returns the number of frames produced.
    pub async fn run<F>(&self, shutdown: &CancellationToken, mut on_frame: F) -> u64
    where
        F: FnMut(&PlotFrame),
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut frames = 0;

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    on_frame(&self.frame());
                    frames += 1;
                }
            }
        }

        debug!(frames, "viewer stopped");
        frames
    }
}
