//! Configuration for BucketDB
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::MEMORY_PATH;

/// Main configuration for a BucketDB store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Path of the append-only log file, or [`MEMORY_PATH`] for a
    /// memory-only store. Missing parent directories are created on open.
    pub path: PathBuf,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync the log
    pub sync_strategy: SyncStrategy,
}

/// Log sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStrategy {
    /// fsync before every write returns (safest, slowest)
    EveryWrite,

    /// fsync from a background thread every `ms` milliseconds; at most one
    /// interval of writes can be lost on power failure
    Interval { ms: u64 },
}

impl SyncStrategy {
    /// Map a flush interval in milliseconds to a strategy. Zero means
    /// synchronous fsync on every write.
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            SyncStrategy::EveryWrite
        } else {
            SyncStrategy::Interval { ms }
        }
    }

    /// The flush interval in milliseconds (0 for `EveryWrite`).
    pub fn interval_ms(&self) -> u64 {
        match self {
            SyncStrategy::EveryWrite => 0,
            SyncStrategy::Interval { ms } => *ms,
        }
    }
}

impl Default for SyncStrategy {
    fn default() -> Self {
        SyncStrategy::Interval { ms: 100 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./bucketdb_data/data.aof"),
            sync_strategy: SyncStrategy::default(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Config for a memory-only store (no log file)
    pub fn memory() -> Self {
        Self {
            path: PathBuf::from(MEMORY_PATH),
            sync_strategy: SyncStrategy::EveryWrite,
        }
    }

    /// Whether this config selects memory-only operation
    pub fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the log file path (or [`MEMORY_PATH`])
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the flush interval in milliseconds (0 = fsync every write)
    pub fn flush_interval_ms(mut self, ms: u64) -> Self {
        self.config.sync_strategy = SyncStrategy::from_millis(ms);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
