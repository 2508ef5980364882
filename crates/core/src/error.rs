//! Error types for feedcheck
//!
//! One enum covers every failure the harness can hit. The variants follow the
//! harness taxonomy: connection and administrative failures, write-batch
//! failures, feed failures, point-read failures and sentinel failures.
//! Reconciliation mismatches are findings, not errors, and never appear here.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for feedcheck operations
pub type Result<T> = std::result::Result<T, Error>;

/// Server error code returned by `shardCollection` when the collection is
/// already sharded.
pub const ALREADY_INITIALIZED: i32 = 23;

/// Error types for the harness
#[derive(Debug, Error)]
pub enum Error {
    /// Could not reach or authenticate against the store
    #[error("Connection error: {0}")]
    Connection(String),

    /// Administrative command rejected by the store
    #[error("Admin command '{command}' failed: {message}")]
    Admin {
        /// Command name (e.g. `shardCollection`)
        command: String,
        /// Server error code, when the store reported one
        code: Option<i32>,
        /// Server message
        message: String,
    },

    /// A batched write was rejected or partially applied
    #[error("Write batch of {ops} operations failed: {message}")]
    WriteBatch {
        /// Number of operations in the failed batch
        ops: usize,
        /// Driver or server message
        message: String,
    },

    /// Opening or polling the change feed failed
    #[error("Change feed error: {0}")]
    Feed(String),

    /// A point read of a single document failed
    #[error("Point read failed: {0}")]
    Read(String),

    /// The end-of-pass sentinel could not be written
    #[error("Sentinel write failed: {0}")]
    SentinelWrite(String),

    /// The generator task went away without signalling completion
    #[error("Generator task ended without signalling completion")]
    GeneratorLost,

    /// Invalid harness configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error (config file loading)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Build an administrative error.
    pub fn admin(command: impl Into<String>, code: Option<i32>, message: impl Into<String>) -> Self {
        Error::Admin {
            command: command.into(),
            code,
            message: message.into(),
        }
    }

    /// True when this is the "already sharded" administrative error.
    pub fn is_already_sharded(&self) -> bool {
        matches!(
            self,
            Error::Admin {
                code: Some(ALREADY_INITIALIZED),
                ..
            }
        )
    }

    /// True for failures that must abort the whole run.
    ///
    /// Write-batch failures only abort the phase that issued them, and point
    /// read failures only skip the event being checked.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::WriteBatch { .. } | Error::Read(_))
    }
}
