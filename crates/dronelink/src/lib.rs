//! `dronelink` - Drone telemetry ingestion over TCP
//!
//! Producers send length-prefixed JSON messages over TCP. Every accepted
//! connection is served by its own task that decodes messages and pushes
//! coordinate batches onto a single ordered queue. One consumer loop pops
//! the queue, persists each batch and keeps the most recent N points per
//! drone in sliding windows for display.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod protocol;
pub mod replay;
pub mod server;
pub mod simulator;
pub mod storage;
pub mod viewer;
pub mod window;

pub use client::TelemetryClient;
pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use pipeline::{Consumer, PipelineContext, PipelineEvent, StopReason};
pub use protocol::{Message, PointRecord};
pub use server::{IngestionServer, ServerStats};
pub use window::{SlidingWindow, WindowSet};
