//! Command-line interface for dronelink.
//!
//! This module provides the CLI structure for the `dronelink` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::Verbosity;

pub use commands::{BackendArg, ConfigCommand, ReplayCommand, ServeCommand, SimulateCommand};

/// dronelink - Drone telemetry ingestion
///
/// Receives framed coordinate batches over TCP, persists them and keeps
/// a sliding window of recent positions per drone.
#[derive(Debug, Parser)]
#[command(name = "dronelink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the ingestion server and consumer
    Serve(ServeCommand),

    /// Send a simulated flight to a server
    Simulate(SimulateCommand),

    /// Replay a recorded CSV file through the sliding windows
    Replay(ReplayCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}
