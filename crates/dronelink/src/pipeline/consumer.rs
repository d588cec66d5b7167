//! The single consumer loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::{PipelineContext, PipelineEvent, PipelineReceiver, Popped};
use crate::config::PipelineConfig;
use crate::protocol::PointRecord;
use crate::storage::{PersistedRecord, RecordSink};
use crate::window::WindowSet;

/// Lifecycle of the consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Not started, or stopped and ready to be run again.
    Stopped,
    /// Inside [`Consumer::run`].
    Running,
}

/// Why [`Consumer::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// An `END` sentinel was popped.
    EndOfStream,
    /// The shutdown token was cancelled.
    Shutdown,
    /// Every producer handle is gone and the queue is drained.
    QueueClosed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EndOfStream => write!(f, "end of stream"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::QueueClosed => write!(f, "queue closed"),
        }
    }
}

/// Counters kept by the consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Coordinate batches consumed.
    pub batches: u64,
    /// Individual points consumed.
    pub records: u64,
    /// Capacity changes applied.
    pub capacity_updates: u64,
    /// Batches the sink failed to store.
    pub persist_errors: u64,
}

/// Pops pipeline events in arrival order, persists them and feeds the
/// sliding windows.
///
/// The consumer is the authoritative ordering point: each batch is stamped
/// with the wall-clock time at which it is consumed, and each point is
/// assigned the drone id given by its 1-based position in the batch.
#[derive(Debug)]
pub struct Consumer {
    receiver: PipelineReceiver,
    sink: Box<dyn RecordSink>,
    windows: Arc<WindowSet>,
    shutdown: CancellationToken,
    capacity: usize,
    poll_interval: Duration,
    state: ConsumerState,
    stats: ConsumerStats,
}

impl Consumer {
    /// Create a consumer bound to the context's windows and shutdown token.
    #[must_use]
    pub fn new(
        receiver: PipelineReceiver,
        sink: Box<dyn RecordSink>,
        context: &PipelineContext,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            receiver,
            sink,
            windows: context.windows(),
            shutdown: context.shutdown().clone(),
            capacity: config.last_points_number,
            poll_interval: config.poll_interval(),
            state: ConsumerState::Stopped,
            stats: ConsumerStats::default(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Capacity given to windows created from now on.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Counters since construction.
    #[must_use]
    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Events still waiting in the queue.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.receiver.pending()
    }

    /// Run until `END`, shutdown, or queue closure.
    ///
    /// The queue is polled with a bounded wait so an idle loop still
    /// notices shutdown. Events pushed after `END` stay queued; calling
    /// `run` again picks them up.
    pub async fn run(&mut self) -> StopReason {
        self.state = ConsumerState::Running;
        info!(capacity = self.capacity, "consumer loop started");

        let reason = loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break StopReason::Shutdown,
                popped = self.receiver.pop_timeout(self.poll_interval) => match popped {
                    Popped::Event(PipelineEvent::End) => break StopReason::EndOfStream,
                    Popped::Event(event) => self.handle(event),
                    Popped::Empty => trace!("pipeline queue idle"),
                    Popped::Closed => break StopReason::QueueClosed,
                },
            }
        };

        if let Err(e) = self.sink.flush() {
            error!(error = %e, "failed to flush record sink");
        }
        self.state = ConsumerState::Stopped;
        info!(
            reason = %reason,
            batches = self.stats.batches,
            records = self.stats.records,
            "consumer loop stopped"
        );
        reason
    }

    /// Apply one non-terminal event.
    pub fn handle(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Capacity(capacity) => self.set_capacity(capacity),
            PipelineEvent::Batch(points) => self.consume_batch(&points),
            PipelineEvent::End => debug!("END sentinel outside run loop ignored"),
        }
    }

    fn set_capacity(&mut self, capacity: usize) {
        if capacity != self.capacity {
            info!(
                from = self.capacity,
                to = capacity,
                "window capacity changed; existing windows keep their size"
            );
        }
        self.capacity = capacity;
        self.stats.capacity_updates += 1;
    }

    fn consume_batch(&mut self, points: &[PointRecord]) {
        let now = Local::now();
        let records: Vec<PersistedRecord> = points
            .iter()
            .enumerate()
            .map(|(i, point)| PersistedRecord {
                time: now,
                drone_index: i + 1,
                point: *point,
            })
            .collect();

        if let Err(e) = self.sink.append(&records) {
            self.stats.persist_errors += 1;
            error!(error = %e, points = records.len(), "failed to persist batch");
        }

        for record in &records {
            self.windows.update(
                record.drone_index,
                record.point.x,
                record.point.y,
                self.capacity,
            );
        }

        self.stats.batches += 1;
        self.stats.records += records.len() as u64;
        debug!(points = records.len(), "batch consumed");
    }
}
