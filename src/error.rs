//! Error types for the oomgen exhaustion generators
//!
//! This module provides structured error definitions using thiserror, plus
//! the discriminated exit signal a generator run resolves to.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for oomgen operations
#[derive(Error, Debug)]
pub enum OomgenError {
    /// Payload blob could not be read from disk
    #[error("failed to read payload {}: {source}", .path.display())]
    PayloadRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Payload blob is not a usable code unit definition
    #[error("payload {} is empty, not a valid code unit definition", .0.display())]
    PayloadMalformed(PathBuf),

    /// I/O error (report sink, payload setup)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for oomgen operations
pub type Result<T> = std::result::Result<T, OomgenError>;

/// Convert anyhow::Error to OomgenError
impl From<anyhow::Error> for OomgenError {
    fn from(err: anyhow::Error) -> Self {
        OomgenError::Other(err.to_string())
    }
}

/// How a generator run ended.
///
/// Cancellation and fatal errors are distinct signal kinds, not two flavors
/// of one exception; a run resolves to exactly one of them at a loop
/// iteration boundary. Exhaustion itself never produces a `RunExit`: the
/// allocator aborts the process, which is the tool's designed output.
#[derive(Debug)]
pub enum RunExit {
    /// Cooperative stop requested during pacing; a clean, expected exit
    Cancelled,
    /// Unrecoverable internal error; the run stopped abnormally
    Fatal(OomgenError),
}

impl RunExit {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunExit::Cancelled)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RunExit::Fatal(_))
    }
}
