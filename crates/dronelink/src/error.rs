//! Error types for dronelink.
//!
//! Connection-scoped failures (framing, transport, protocol) live in
//! [`crate::protocol`] and never escape a single connection. This module
//! holds the process-level errors: configuration, persistence, binding
//! and replay.

use std::path::PathBuf;
use thiserror::Error;

use crate::protocol::EncodeError;

/// The main error type for dronelink operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Network Errors ===
    /// Failed to bind the listening socket.
    #[error("failed to bind to {address}: {source}")]
    Bind {
        /// Address we tried to bind.
        address: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to connect to an ingestion server.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        /// Address we tried to reach.
        address: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Replay Errors ===
    /// A persisted record could not be parsed during replay.
    #[error("line {line}: {message}")]
    Replay {
        /// 1-based line number in the source file.
        line: usize,
        /// What was wrong with the line.
        message: String,
    },

    // === I/O Errors ===
    /// File system or socket operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// A message could not be encoded for the wire.
    #[error("failed to encode message: {0}")]
    Encode(#[from] EncodeError),

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for dronelink operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a replay error for the given line.
    #[must_use]
    pub fn replay(line: usize, message: impl Into<String>) -> Self {
        Self::Replay {
            line,
            message: message.into(),
        }
    }
}
