//! Store Module
//!
//! The caller-facing store that coordinates the index and the log.
//!
//! ## Responsibilities
//! - Validate caller input before anything is logged
//! - Log-then-index ordering for every mutation
//! - Concurrent readers, strictly serialized writers
//! - Replay on open, compaction on request

use std::path::Path;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aof::{encode_del, encode_set, AofPersister, CompactionResult};
use crate::config::Config;
use crate::error::{DbError, Result};
use crate::index::{Bucket, Index, SortRecord};

/// An in-memory bucket/key/value store, optionally backed by a log
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (set/del/defrag/close): hold the index write lock for the
///   whole call, including the log append
///   - The Nth successful mutation is the Nth log entry
///   - A failed append leaves the index untouched
///
/// - **Reads** (get/get_all/get_all_sorted/get_new_index/info): share the
///   index read lock, never overlap a writer
///   - The log is never read after open
#[derive(Debug)]
pub struct Store {
    /// Store configuration
    config: Config,

    /// All live records
    index: RwLock<Index>,

    /// Log persister, `None` in memory-only mode
    aof: Option<AofPersister>,
}

/// Record and bucket counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub records: usize,
    pub buckets: usize,
    pub persistent: bool,
}

impl Store {
    /// Open a store at `path`, or a memory-only store for [`crate::MEMORY_PATH`].
    ///
    /// `flush_interval_ms` of 0 fsyncs every write; otherwise a background
    /// thread fsyncs at that interval.
    pub fn open(path: impl AsRef<Path>, flush_interval_ms: u64) -> Result<Self> {
        let config = Config::builder()
            .path(path.as_ref())
            .flush_interval_ms(flush_interval_ms)
            .build();
        Self::open_with_config(config)
    }

    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Memory sentinel: start empty, no log
    /// 2. Otherwise open the log and adopt its replayed index
    pub fn open_with_config(config: Config) -> Result<Self> {
        let (aof, index) = if config.is_memory() {
            (None, Index::new())
        } else {
            let (aof, index) = AofPersister::open(&config.path, config.sync_strategy)?;
            (Some(aof), index)
        };

        info!(
            path = %config.path.display(),
            records = index.record_count(),
            buckets = index.bucket_count(),
            "store opened"
        );

        Ok(Self {
            config,
            index: RwLock::new(index),
            aof,
        })
    }

    /// Store one value in a bucket
    ///
    /// Values are opaque bytes, except that the two-byte sequence `\` `n`
    /// is read back from the log as a newline after a reopen.
    ///
    /// Steps:
    /// 1. Reject an empty bucket name or negative key
    /// 2. Acquire the write lock
    /// 3. Append to the log (durability)
    /// 4. Insert into the index
    pub fn set(&self, bucket: &str, key: i64, value: impl Into<Bytes>) -> Result<()> {
        validate_set_input(bucket, key)?;
        let value = value.into();

        let mut index = self.index.write();

        if let Some(aof) = &self.aof {
            aof.write(&encode_set(bucket, key, &value))?;
        }

        index.set(bucket, key, value);
        Ok(())
    }

    /// Get one value; a missing bucket or key is simply `None`
    pub fn get(&self, bucket: &str, key: i64) -> Option<Bytes> {
        self.index.read().get(bucket, key).cloned()
    }

    /// Delete one value from a bucket
    ///
    /// Returns `Ok(false)` when the bucket or key does not exist; nothing is
    /// logged in that case. The bucket is removed with its last key.
    pub fn del(&self, bucket: &str, key: i64) -> Result<bool> {
        let mut index = self.index.write();

        if !index.contains(bucket, key) {
            return Ok(false);
        }

        if let Some(aof) = &self.aof {
            aof.write(&encode_del(bucket, key))?;
        }

        index.remove(bucket, key);
        Ok(true)
    }

    /// All records of a bucket, in unspecified order
    pub fn get_all(&self, bucket: &str) -> Result<Bucket> {
        self.index
            .read()
            .bucket(bucket)
            .cloned()
            .ok_or_else(|| DbError::BucketNotFound(bucket.to_string()))
    }

    /// All records of a bucket, sorted ascending by key
    pub fn get_all_sorted(&self, bucket: &str) -> Result<Vec<SortRecord>> {
        self.index
            .read()
            .sorted(bucket)
            .ok_or_else(|| DbError::BucketNotFound(bucket.to_string()))
    }

    /// Next free key of a bucket: largest key + 1, or 1 for an absent bucket.
    ///
    /// Fails with `InvalidInput` when the bucket already holds `i64::MAX`.
    /// Not atomic with a following `set`; callers that race on
    /// auto-increment keys must serialize themselves.
    pub fn get_new_index(&self, bucket: &str) -> Result<i64> {
        self.index.read().next_key(bucket).ok_or_else(|| {
            DbError::InvalidInput(format!("bucket ({}) has no free key above {}", bucket, i64::MAX))
        })
    }

    /// Summary line, e.g. `"3 record(s) in 2 bucket(s)"`
    pub fn info(&self) -> String {
        let stats = self.stats();
        format!("{} record(s) in {} bucket(s)", stats.records, stats.buckets)
    }

    /// Record and bucket counts
    pub fn stats(&self) -> StoreStats {
        let index = self.index.read();
        StoreStats {
            records: index.record_count(),
            buckets: index.bucket_count(),
            persistent: self.aof.is_some(),
        }
    }

    /// Compact the log to one `set` per live record.
    ///
    /// Fails with `DbError::MemoryMode` when there is no log.
    pub fn defrag(&self) -> Result<CompactionResult> {
        let index = self.index.write();
        let aof = self.aof.as_ref().ok_or(DbError::MemoryMode)?;

        let result = aof.defrag(&index)?;
        debug!(records = result.records, saved = result.bytes_saved(), "store defragmented");
        Ok(result)
    }

    /// Force an fsync of the log (no-op in memory-only mode)
    pub fn sync(&self) -> Result<()> {
        let _index = self.index.write();
        match &self.aof {
            Some(aof) => aof.sync(),
            None => Ok(()),
        }
    }

    /// Close the store gracefully
    ///
    /// Closes the log (flusher stopped, final fsync) and clears the index.
    pub fn close(self) -> Result<()> {
        {
            let mut index = self.index.write();

            if let Some(aof) = &self.aof {
                aof.close()?;
            }

            index.clear();
        }

        info!(path = %self.config.path.display(), "store closed");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Log path, `None` in memory-only mode
    pub fn path(&self) -> Option<&Path> {
        self.aof.as_ref().map(AofPersister::path)
    }

    /// Whether mutations are mirrored to a log
    pub fn is_persistent(&self) -> bool {
        self.aof.is_some()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Caller input checks, done before the log is touched
fn validate_set_input(bucket: &str, key: i64) -> Result<()> {
    if bucket.is_empty() {
        return Err(DbError::InvalidInput("bucket name cannot be empty".to_string()));
    }

    if key < 0 {
        return Err(DbError::InvalidInput(format!("key must be non-negative, got {}", key)));
    }

    Ok(())
}
