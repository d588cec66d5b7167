//! Delivery pipeline between connection handlers and the consumer loop.
//!
//! All handlers push into one unbounded, ordered queue; exactly one
//! [`Consumer`] pops from it. Events from a single connection keep their
//! production order end to end. Events from different connections interleave
//! in arrival order.
//!
//! ```text
//! handler ─┐
//! handler ─┼─► PipelineQueue ─► Consumer ─┬─► RecordSink
//! handler ─┘                              └─► WindowSet ─► Viewer
//! ```

mod consumer;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::PointRecord;
use crate::window::WindowSet;

pub use consumer::{Consumer, ConsumerState, ConsumerStats, StopReason};

/// An item travelling through the pipeline queue.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Window capacity for drones first seen after this event.
    Capacity(usize),
    /// One coordinate batch, in producer order.
    Batch(Vec<PointRecord>),
    /// Terminal sentinel: stop the consumer loop.
    End,
}

/// The queue was closed because its consumer is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("pipeline queue closed")]
pub struct QueueClosed;

/// Producer side of the pipeline queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PipelineSender {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl PipelineSender {
    /// Enqueue an event without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] if the receiver has been dropped.
    pub fn push(&self, event: PipelineEvent) -> Result<(), QueueClosed> {
        self.tx.send(event).map_err(|_| QueueClosed)
    }

    /// Check if the receiver has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Result of a bounded wait on the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Popped {
    /// The next event in arrival order.
    Event(PipelineEvent),
    /// Nothing arrived before the deadline.
    Empty,
    /// Every sender is gone and the queue is drained.
    Closed,
}

/// Consumer side of the pipeline queue.
#[derive(Debug)]
pub struct PipelineReceiver {
    rx: mpsc::UnboundedReceiver<PipelineEvent>,
}

impl PipelineReceiver {
    /// Wait up to `wait` for the next event.
    pub async fn pop_timeout(&mut self, wait: Duration) -> Popped {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(event)) => Popped::Event(event),
            Ok(None) => Popped::Closed,
            Err(_) => Popped::Empty,
        }
    }

    /// Number of events waiting to be consumed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

/// Create a connected sender/receiver pair.
#[must_use]
pub fn queue() -> (PipelineSender, PipelineReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PipelineSender { tx }, PipelineReceiver { rx })
}

/// Process-wide shared state, built once at startup.
///
/// Holds the producer end of the queue, the sliding windows and the
/// shutdown token. Cloning hands out another handle to the same state.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    queue: PipelineSender,
    windows: Arc<WindowSet>,
    shutdown: CancellationToken,
}

impl PipelineContext {
    /// Build the context and the single receiver for the consumer loop.
    #[must_use]
    pub fn new() -> (Self, PipelineReceiver) {
        let (queue, receiver) = queue();
        let context = Self {
            queue,
            windows: Arc::new(WindowSet::new()),
            shutdown: CancellationToken::new(),
        };
        (context, receiver)
    }

    /// Producer end of the pipeline queue.
    #[must_use]
    pub fn queue(&self) -> &PipelineSender {
        &self.queue
    }

    /// Shared sliding windows.
    #[must_use]
    pub fn windows(&self) -> Arc<WindowSet> {
        Arc::clone(&self.windows)
    }

    /// Token cancelled on process shutdown.
    #[must_use]
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_preserves_order() {
        let (tx, mut rx) = queue();
        tx.push(PipelineEvent::Capacity(3)).unwrap();
        tx.push(PipelineEvent::Batch(vec![PointRecord::new(1.0, 2.0, 3.0)]))
            .unwrap();
        tx.push(PipelineEvent::End).unwrap();
        assert_eq!(rx.pending(), 3);

        let wait = Duration::from_millis(50);
        assert_eq!(
            rx.pop_timeout(wait).await,
            Popped::Event(PipelineEvent::Capacity(3))
        );
        assert!(matches!(
            rx.pop_timeout(wait).await,
            Popped::Event(PipelineEvent::Batch(_))
        ));
        assert_eq!(rx.pop_timeout(wait).await, Popped::Event(PipelineEvent::End));
    }

    #[tokio::test]
    async fn test_pop_timeout_on_empty_queue() {
        let (_tx, mut rx) = queue();
        assert_eq!(rx.pop_timeout(Duration::from_millis(20)).await, Popped::Empty);
    }

    #[tokio::test]
    async fn test_pop_after_all_senders_dropped() {
        let (tx, mut rx) = queue();
        tx.push(PipelineEvent::End).unwrap();
        drop(tx);

        let wait = Duration::from_millis(50);
        assert_eq!(rx.pop_timeout(wait).await, Popped::Event(PipelineEvent::End));
        assert_eq!(rx.pop_timeout(wait).await, Popped::Closed);
    }

    #[test]
    fn test_push_after_receiver_dropped() {
        let (tx, rx) = queue();
        drop(rx);
        assert!(tx.is_closed());
        assert_eq!(tx.push(PipelineEvent::End), Err(QueueClosed));
    }

    #[test]
    fn test_context_clones_share_state() {
        let (context, _rx) = PipelineContext::new();
        let other = context.clone();

        other.windows().update(1, 1.0, 1.0, 5);
        assert_eq!(context.windows().snapshot(1), vec![(1.0, 1.0)]);

        other.shutdown().cancel();
        assert!(context.shutdown().is_cancelled());
    }
}
