//! Error types for BucketDB
//!
//! Provides a unified error type for all operations.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using DbError
pub type Result<T> = std::result::Result<T, DbError>;

/// Unified error type for BucketDB operations
#[derive(Debug, Error)]
pub enum DbError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Open Errors
    // -------------------------------------------------------------------------
    #[error("open: invalid path '{0}'")]
    InvalidPath(String),

    #[error("open ({}) failed: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Log Errors
    // -------------------------------------------------------------------------
    #[error("database corrupted ({}) on line {line}: {reason}", path.display())]
    Corruption {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("invalid log entry: {0}")]
    Validation(String),

    #[error("write to {} failed: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("log file {} is closed", .0.display())]
    Closed(PathBuf),

    #[error("defrag ({}) failed during {stage}: {source}", path.display())]
    Compaction {
        stage: CompactionStage,
        path: PathBuf,
        #[source]
        source: Box<DbError>,
    },

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("bucket ({0}) not found")]
    BucketNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("operation requires a log file, store is memory-only")]
    MemoryMode,
}

/// The step of a defrag that failed.
///
/// Once `Backup` has succeeded the `.bak` file is the recovery artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionStage {
    Close,
    Backup,
    Verify,
    Rewrite,
}

impl fmt::Display for CompactionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompactionStage::Close => "close",
            CompactionStage::Backup => "backup",
            CompactionStage::Verify => "backup verification",
            CompactionStage::Rewrite => "rewrite",
        };
        f.write_str(name)
    }
}

impl DbError {
    /// True for errors detected while validating an existing log at open.
    pub fn is_corruption(&self) -> bool {
        matches!(self, DbError::Corruption { .. })
    }

    pub(crate) fn compaction(stage: CompactionStage, path: impl Into<PathBuf>, source: DbError) -> Self {
        DbError::Compaction {
            stage,
            path: path.into(),
            source: Box::new(source),
        }
    }
}
