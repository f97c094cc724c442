//! Error types for build cycles

use crate::deps::DependencyError;
use sift_core::{Operation, SnapshotError};
use std::path::PathBuf;

/// Boxed error returned by filter callbacks
pub type FilterError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that abort a build cycle
///
/// Per-file variants carry the relative path and the source directory so a
/// failure can be traced back to the file that caused it.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The filter does not satisfy its capability contract
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Engine options are unusable
    #[error("invalid engine options: {0}")]
    InvalidOptions(String),

    /// The input tree could not be enumerated
    #[error("failed to scan {dir}: {source}")]
    Scan {
        /// Directory being scanned
        dir: PathBuf,
        /// Underlying snapshot error
        source: SnapshotError,
    },

    /// A mkdir/rmdir/unlink/link failed
    #[error("{op} {path} failed: {source}")]
    Structural {
        /// Operation being applied
        op: Operation,
        /// Destination path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A source file could not be read as text
    #[error("failed to read {relative_path} in {source_dir}: {source}")]
    Read {
        /// File relative to the source directory
        relative_path: String,
        /// Source directory of the cycle
        source_dir: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The filter failed for one file
    #[error("failed to process {relative_path} in {source_dir}: {source}")]
    Transform {
        /// File relative to the source directory
        relative_path: String,
        /// Source directory of the cycle
        source_dir: PathBuf,
        /// Error raised by the filter
        source: FilterError,
    },

    /// Output could not be written
    #[error("failed to write {path}: {source}")]
    Write {
        /// Destination file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The filter accepted a file but mapped it to no destination
    #[error("{relative_path} is accepted by filter {filter} but has no destination path")]
    NoDestination {
        /// Filter name
        filter: String,
        /// File relative to the source directory
        relative_path: String,
    },

    /// The destination could not be emptied during a reset
    #[error("failed to reset {path}: {source}")]
    Reset {
        /// Entry that could not be removed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A content task panicked or was cancelled
    #[error("content task failed to complete: {0}")]
    TaskPanicked(String),

    /// Discovered dependencies could not be recorded
    #[error(transparent)]
    Dependency(#[from] DependencyError),
}

impl EngineError {
    /// Relative path of the file involved, for per-file failures
    pub fn relative_path(&self) -> Option<&str> {
        match self {
            EngineError::Read { relative_path, .. }
            | EngineError::Transform { relative_path, .. }
            | EngineError::NoDestination { relative_path, .. } => Some(relative_path),
            _ => None,
        }
    }
}
