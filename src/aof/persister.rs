//! AOF Persister
//!
//! Owns the append-only log file: replays it on open, appends validated
//! frames, keeps the background flusher running and rewrites the file on
//! defrag. This is the only component that touches the filesystem.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::SyncStrategy;
use crate::error::{CompactionStage, DbError, Result};
use crate::index::Index;

use super::compaction::{self, CompactionResult};
use super::entry::{validate_frame, LogEntry};
use super::flusher::{start_flusher, FlushHandle};
use super::recovery::LogRecovery;

/// Append-only log persister
///
/// ## Concurrency:
/// - `state`: Mutex serializing every write, sync and close against the
///   file handle (the Store already serializes mutations, this protects
///   direct callers)
/// - `defrag_lock`: serializes defrags of this file only; separate
///   persisters never contend
/// - All methods use `&self`
#[derive(Debug)]
pub struct AofPersister {
    /// Path of the log file
    path: PathBuf,

    /// When to fsync
    sync_strategy: SyncStrategy,

    /// Open file, flusher and tracked size; `file` is `None` once closed
    state: Mutex<LogState>,

    /// Serializes defrags of this file
    defrag_lock: Mutex<()>,
}

#[derive(Debug, Default)]
struct LogState {
    file: Option<File>,
    flusher: Option<FlushHandle>,
    /// Bytes in the file, used to cut off a partially appended frame
    size: u64,
}

impl AofPersister {
    /// Open or create a log and replay it.
    ///
    /// On open:
    /// 1. Check the path is in clean form
    /// 2. Create missing parent directories
    /// 3. Create the file if it does not exist
    /// 4. Validate the whole file, then fold it into an index
    /// 5. Start the flusher (interval strategy only)
    pub fn open(path: impl AsRef<Path>, sync_strategy: SyncStrategy) -> Result<(Self, Index)> {
        let path = clean_path(path.as_ref())?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| DbError::Open {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = open_append(&path).map_err(|source| DbError::Open {
            path: path.clone(),
            source,
        })?;

        let (index, result) = LogRecovery::replay(&path)?;
        info!(
            path = %path.display(),
            entries = result.entries_recovered,
            lines = result.lines_read,
            records = result.records,
            buckets = result.buckets,
            "log replayed"
        );

        let persister = Self {
            path,
            sync_strategy,
            state: Mutex::new(LogState::default()),
            defrag_lock: Mutex::new(()),
        };
        persister.install(&mut persister.state.lock(), file)?;

        Ok((persister, index))
    }

    /// Append an encoded frame.
    ///
    /// The frame is checked against the log grammar first; an invalid frame
    /// never reaches the file. With `SyncStrategy::EveryWrite` the file is
    /// fsynced before returning.
    pub fn write(&self, frame: &[u8]) -> Result<()> {
        validate_frame(frame)?;

        let mut state = self.state.lock();
        let size = state.size;
        let file = state
            .file
            .as_mut()
            .ok_or_else(|| DbError::Closed(self.path.clone()))?;

        if let Err(source) = file.write_all(frame) {
            cut_off(&self.path, file, size);
            return Err(self.write_error(source));
        }

        // A frame the caller is told failed must not come back on replay
        if self.sync_strategy == SyncStrategy::EveryWrite {
            if let Err(source) = file.sync_all() {
                cut_off(&self.path, file, size);
                return Err(self.write_error(source));
            }
        }

        state.size = size + frame.len() as u64;
        Ok(())
    }

    /// Encode and append an entry
    pub fn append(&self, entry: &LogEntry) -> Result<()> {
        self.write(&entry.encode())
    }

    /// Force an fsync regardless of the sync strategy
    pub fn sync(&self) -> Result<()> {
        let state = self.state.lock();
        let file = state
            .file
            .as_ref()
            .ok_or_else(|| DbError::Closed(self.path.clone()))?;
        file.sync_all().map_err(|source| self.write_error(source))
    }

    /// Rewrite the log to contain exactly one `set` per record of `snapshot`.
    ///
    /// Steps:
    /// 1. Close the live file (stops the flusher, final fsync)
    /// 2. Copy it to `<path>.bak` and verify the copy
    /// 3. Remove and recreate the log
    /// 4. Write the snapshot, fsync, restart the flusher
    ///
    /// If a step after 2 fails the persister stays closed and the `.bak`
    /// file holds the pre-defrag log. A closed persister is rejected before
    /// anything is touched, so a retry cannot overwrite that backup.
    pub fn defrag(&self, snapshot: &Index) -> Result<CompactionResult> {
        let _defrag = self.defrag_lock.lock();
        let mut state = self.state.lock();

        if state.file.is_none() {
            return Err(DbError::compaction(
                CompactionStage::Close,
                &self.path,
                DbError::Closed(self.path.clone()),
            ));
        }

        info!(path = %self.path.display(), records = snapshot.record_count(), "defrag started");

        self.close_locked(&mut state)
            .map_err(|e| DbError::compaction(CompactionStage::Close, &self.path, e))?;

        let (backup_path, bytes_before) = compaction::make_backup(&self.path)?;
        debug!(backup = %backup_path.display(), bytes = bytes_before, "backup written");

        compaction::remove_log(&self.path)?;
        let file = open_append(&self.path)
            .map_err(|e| DbError::compaction(CompactionStage::Rewrite, &self.path, DbError::Io(e)))?;

        let records = compaction::write_snapshot(&self.path, &file, snapshot)?;

        self.install(&mut state, file)
            .map_err(|e| DbError::compaction(CompactionStage::Rewrite, &self.path, e))?;
        let bytes_after = state.size;

        info!(
            path = %self.path.display(),
            records,
            bytes_before,
            bytes_after,
            "defrag finished"
        );

        Ok(CompactionResult {
            records,
            bytes_before,
            bytes_after,
            backup_path,
        })
    }

    /// Stop the flusher, fsync and close the file.
    ///
    /// Once this returns the flusher thread has exited. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.close_locked(&mut state)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured sync strategy
    pub fn sync_strategy(&self) -> SyncStrategy {
        self.sync_strategy
    }

    /// Whether the file is open for writing
    pub fn is_open(&self) -> bool {
        self.state.lock().file.is_some()
    }

    /// Whether the background flusher thread is alive
    pub fn is_flushing(&self) -> bool {
        self.state.lock().flusher.as_ref().map_or(false, FlushHandle::is_running)
    }

    /// Current size of the log in bytes
    pub fn size(&self) -> u64 {
        self.state.lock().size
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Adopt an open file and start the flusher for it
    fn install(&self, state: &mut LogState, file: File) -> Result<()> {
        state.size = file.metadata().map_err(|source| DbError::Open {
            path: self.path.clone(),
            source,
        })?.len();

        if let SyncStrategy::Interval { ms } = self.sync_strategy {
            state.flusher = Some(start_flusher(self.path.clone(), &file, Duration::from_millis(ms))?);
        }

        state.file = Some(file);
        Ok(())
    }

    fn close_locked(&self, state: &mut LogState) -> Result<()> {
        if let Some(flusher) = state.flusher.take() {
            flusher.stop();
        }

        if let Some(file) = state.file.take() {
            file.sync_all().map_err(|source| self.write_error(source))?;
            debug!(path = %self.path.display(), bytes = state.size, "log closed");
        }

        Ok(())
    }

    fn write_error(&self, source: std::io::Error) -> DbError {
        DbError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl Drop for AofPersister {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(flusher) = state.flusher.take() {
            flusher.stop();
        }
        if let Some(file) = state.file.take() {
            let _ = file.sync_all();
        }
    }
}

/// Reject paths that are not in clean form: empty, `.`/`..` components,
/// repeated or trailing separators.
fn clean_path(path: &Path) -> Result<PathBuf> {
    let invalid = || DbError::InvalidPath(path.display().to_string());

    if path.as_os_str().is_empty() {
        return Err(invalid());
    }

    if path
        .components()
        .any(|c| matches!(c, Component::CurDir | Component::ParentDir))
    {
        return Err(invalid());
    }

    let cleaned: PathBuf = path.components().collect();
    if cleaned.as_os_str() != path.as_os_str() {
        return Err(invalid());
    }

    Ok(cleaned)
}

/// Truncate the log back to `size`, dropping a frame that did not make it
fn cut_off(path: &Path, file: &File, size: u64) {
    if let Err(e) = file.set_len(size) {
        warn!(path = %path.display(), error = %e, "could not cut off failed write");
    }
}

/// Open (or create) a log file for appending
fn open_append(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}
