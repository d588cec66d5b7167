//! Per-drone sliding windows of recent positions.
//!
//! Each drone gets a bounded FIFO of `(x, y)` pairs, created lazily the first
//! time a point is seen for it. A window's capacity is fixed when it is
//! created; later capacity changes only affect windows created afterwards.
//!
//! [`WindowSet`] is shared between the consumer loop (single writer) and the
//! viewer (reader). Snapshots are copied out under the lock, so a reader
//! never observes a half-applied update.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{PoisonError, RwLock};

/// Identifies a drone: its 1-based position within a coordinate batch.
pub type EntityId = usize;

/// A planar position as kept for display.
pub type Point2 = (f64, f64);

/// Bounded FIFO of the most recent points for one drone.
#[derive(Debug, Clone, PartialEq)]
pub struct SlidingWindow {
    capacity: usize,
    points: VecDeque<Point2>,
}

impl SlidingWindow {
    /// Create an empty window.
    ///
    /// This is the only place a capacity is clamped: zero is raised to one.
    /// Storage grows with the points pushed, not with the capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            points: VecDeque::new(),
        }
    }

    /// Append a point, evicting the oldest ones first if the window is full.
    pub fn push(&mut self, x: f64, y: f64) {
        while self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back((x, y));
    }

    /// Copy of the current contents, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Point2> {
        self.points.iter().copied().collect()
    }

    /// Maximum number of points retained.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of points currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the window holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// The set of sliding windows, keyed by drone.
#[derive(Debug, Default)]
pub struct WindowSet {
    windows: RwLock<BTreeMap<EntityId, SlidingWindow>>,
}

impl WindowSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a point into `entity`'s window.
    ///
    /// If the window does not exist yet it is created with `capacity`;
    /// an existing window keeps the capacity it was created with.
    pub fn update(&self, entity: EntityId, x: f64, y: f64, capacity: usize) {
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        windows
            .entry(entity)
            .or_insert_with(|| SlidingWindow::new(capacity))
            .push(x, y);
    }

    /// Current contents of `entity`'s window, oldest first.
    ///
    /// Unknown drones yield an empty sequence.
    #[must_use]
    pub fn snapshot(&self, entity: EntityId) -> Vec<Point2> {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&entity)
            .map(SlidingWindow::snapshot)
            .unwrap_or_default()
    }

    /// Consistent copy of every window, taken under a single lock.
    #[must_use]
    pub fn snapshot_all(&self) -> BTreeMap<EntityId, Vec<Point2>> {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, window)| (*id, window.snapshot()))
            .collect()
    }

    /// Capacity of `entity`'s window, if it exists.
    #[must_use]
    pub fn capacity_of(&self, entity: EntityId) -> Option<usize> {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&entity)
            .map(SlidingWindow::capacity)
    }

    /// Drones that have at least one window.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityId> {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Number of windows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if no window has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
