//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::config::Config;
use crate::storage::StorageBackend;

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Output file or database (overrides storage.path)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Persistence backend (overrides storage.backend)
    #[arg(short, long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Do not poll the windows for plot frames
    #[arg(long)]
    pub no_viewer: bool,
}

impl ServeCommand {
    /// Apply the flags on top of a loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(output) = &self.output {
            config.storage.path = Some(output.clone());
        }
        if let Some(backend) = self.backend {
            config.storage.backend = backend.into();
        }
        if self.no_viewer {
            config.viewer.enabled = false;
        }
    }
}

/// Simulate command arguments.
#[derive(Debug, Args)]
pub struct SimulateCommand {
    /// Server host (overrides simulator.host)
    #[arg(long)]
    pub host: Option<String>,

    /// Server port (overrides simulator.port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of drones (overrides simulator.drones)
    #[arg(short, long)]
    pub drones: Option<usize>,

    /// RNG seed, 0 for entropy (overrides simulator.seed)
    #[arg(long)]
    pub seed: Option<u64>,
}

impl SimulateCommand {
    /// Apply the flags on top of a loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.simulator.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.simulator.port = port;
        }
        if let Some(drones) = self.drones {
            config.simulator.drones = drones;
        }
        if let Some(seed) = self.seed {
            config.simulator.seed = seed;
        }
    }
}

/// Replay command arguments.
#[derive(Debug, Args)]
pub struct ReplayCommand {
    /// CSV file written by `serve`
    pub file: PathBuf,

    /// Emit frames as fast as possible
    #[arg(long)]
    pub no_delay: bool,

    /// Window capacity (defaults to pipeline.last_points_number)
    #[arg(short, long)]
    pub last: Option<usize>,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Storage backend argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    /// Delimited text file
    Csv,
    /// `SQLite` database
    Sqlite,
}

impl From<BackendArg> for StorageBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Csv => Self::Csv,
            BackendArg::Sqlite => Self::Sqlite,
        }
    }
}
