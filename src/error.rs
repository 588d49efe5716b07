//! Error types for pre-compress
//!
//! This module defines the error hierarchy for a run:
//! - Configuration errors (ignore patterns, concurrency, m-time)
//! - Filesystem errors, tagged with the operation and path that failed
//! - Worker thread errors
//!
//! Errors are `Send + Sync` so the first one observed by any worker can be
//! published into the shared run outcome.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level error type for pre-compress
#[derive(Error, Debug)]
pub enum PrecompressError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Filesystem errors (stat, open, read, write, rename, listing)
    #[error("Failed to {op} '{}': {source}", .path.display())]
    Io {
        op: IoOp,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

impl PrecompressError {
    /// Wrap an I/O error with the operation and path it failed on
    pub fn io(op: IoOp, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        PrecompressError::Io {
            op,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Returns true if this error came from listing a directory
    pub fn is_traversal(&self) -> bool {
        matches!(self, PrecompressError::Io { op: IoOp::List, .. })
    }
}

/// Filesystem operation that produced an I/O error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Stat,
    Open,
    Read,
    Compress,
    Write,
    SetTimes,
    SetPermissions,
    Remove,
    Rename,
    List,
}

impl fmt::Display for IoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IoOp::Stat => "stat",
            IoOp::Open => "open",
            IoOp::Read => "read",
            IoOp::Compress => "compress",
            IoOp::Write => "write",
            IoOp::SetTimes => "set times on",
            IoOp::SetPermissions => "set permissions on",
            IoOp::Remove => "remove",
            IoOp::Rename => "rename",
            IoOp::List => "list directory",
        };
        f.write_str(s)
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Worker count outside the range the CLI accepts
    #[error("Invalid concurrency {count}: must be between 1 and {max}")]
    InvalidConcurrency { count: usize, max: usize },

    /// A run needs at least one worker
    #[error("Concurrency must be at least 1")]
    NoWorkers,

    /// A single ignore fragment is not a valid regular expression
    #[error("Invalid ignore pattern '{pattern}': {reason}")]
    InvalidIgnorePattern { pattern: String, reason: String },

    /// Modification time could not be parsed
    #[error("Invalid m-time '{value}': {reason}")]
    InvalidMTime { value: String, reason: String },

    /// Root directory is unusable
    #[error("Invalid root '{}': {reason}", .path.display())]
    InvalidRoot { path: PathBuf, reason: String },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker thread could not be started
    #[error("Failed to spawn worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// Every receiver is gone, nothing can drain the queue
    #[error("Work queue closed: all workers have terminated")]
    QueueClosed,
}

/// Result type alias for PrecompressError
pub type Result<T> = std::result::Result<T, PrecompressError>;
