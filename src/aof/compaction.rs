//! Compaction: rewriting the log down to the live records
//!
//! Defrag replaces the full mutation history with one `set` per live
//! record. Before the old log is removed it is copied byte-for-byte to
//! `<path>.bak`, and the copy is checked against the source by CRC32.
//! The backup is never deleted automatically; if a later step fails it is
//! the way back.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{CompactionStage, DbError, Result};
use crate::index::Index;

use super::entry::{encode_set, validate_frame};

/// Suffix appended to the log path for the pre-defrag copy
pub const BACKUP_SUFFIX: &str = ".bak";

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Result of a defrag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionResult {
    /// Number of `set` entries written (= live records)
    pub records: usize,
    /// Log size before compaction
    pub bytes_before: u64,
    /// Log size after compaction
    pub bytes_after: u64,
    /// Where the pre-defrag copy was written
    pub backup_path: PathBuf,
}

impl CompactionResult {
    /// Space saved in bytes.
    pub fn bytes_saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// `<path>.bak`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Copy the log to `<path>.bak`, fsync the copy and verify it.
///
/// Returns the backup path and the number of bytes copied.
pub fn make_backup(path: &Path) -> Result<(PathBuf, u64)> {
    let backup = backup_path(path);
    let stage_err = |stage, source: std::io::Error| DbError::compaction(stage, path, DbError::Io(source));

    let mut source = File::open(path).map_err(|e| stage_err(CompactionStage::Backup, e))?;
    let mut destination = File::create(&backup).map_err(|e| stage_err(CompactionStage::Backup, e))?;

    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut copied = 0u64;

    loop {
        let n = source.read(&mut buf).map_err(|e| stage_err(CompactionStage::Backup, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        destination
            .write_all(&buf[..n])
            .map_err(|e| stage_err(CompactionStage::Backup, e))?;
        copied += n as u64;
    }

    destination.sync_all().map_err(|e| stage_err(CompactionStage::Backup, e))?;
    drop(destination);

    let expected = hasher.finalize();
    let actual = checksum_file(&backup).map_err(|e| stage_err(CompactionStage::Verify, e))?;
    if actual != expected {
        return Err(DbError::compaction(
            CompactionStage::Verify,
            path,
            DbError::Validation(format!(
                "backup {} checksum mismatch: expected 0x{:08x}, got 0x{:08x}",
                backup.display(),
                expected,
                actual
            )),
        ));
    }

    Ok((backup, copied))
}

/// CRC32 of a whole file
pub fn checksum_file(path: &Path) -> std::io::Result<u32> {
    let mut file = File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; COPY_BUF_SIZE];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize())
}

/// Remove the log so it can be recreated empty
pub(crate) fn remove_log(path: &Path) -> Result<()> {
    fs::remove_file(path).map_err(|e| DbError::compaction(CompactionStage::Rewrite, path, DbError::Io(e)))
}

/// Append one `set` per live record of `snapshot` to `file`, in
/// (bucket, key) order, then fsync. Returns the number of records written.
pub(crate) fn write_snapshot(path: &Path, file: &File, snapshot: &Index) -> Result<usize> {
    let rewrite_err = |e: DbError| DbError::compaction(CompactionStage::Rewrite, path, e);

    let mut writer = BufWriter::new(file);
    let mut written = 0usize;

    for (bucket, key, value) in snapshot.records_sorted() {
        let frame = encode_set(bucket, key, value);
        validate_frame(&frame).map_err(rewrite_err)?;
        writer
            .write_all(&frame)
            .map_err(|e| rewrite_err(DbError::Io(e)))?;
        written += 1;
    }

    writer.flush().map_err(|e| rewrite_err(DbError::Io(e)))?;
    file.sync_all().map_err(|e| rewrite_err(DbError::Io(e)))?;

    Ok(written)
}

