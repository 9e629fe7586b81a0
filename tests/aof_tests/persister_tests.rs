//! Tests for AofPersister
//!
//! These tests verify:
//! - Open creates missing directories and the log file
//! - Path validation and corruption errors at open
//! - Validated appends, fsync strategies, the background flusher
//! - Close semantics (flusher stopped, writes rejected, idempotent)
//! - Concurrent direct writers

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use bucketdb::aof::{encode_del, encode_set, AofPersister, LogEntry};
use bucketdb::{DbError, SyncStrategy};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_path() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("data.aof");
    (temp_dir, path)
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_creates_file_and_directories() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("dir").join("data.aof");

    let (aof, index) = AofPersister::open(&path, SyncStrategy::EveryWrite).unwrap();

    assert!(path.exists());
    assert!(index.is_empty());
    assert!(aof.is_open());
    assert_eq!(aof.size(), 0);
    aof.close().unwrap();
}

#[test]
fn test_open_rejects_unclean_path() {
    let err = AofPersister::open("//\\\\:*?\"<>|/invalid.db", SyncStrategy::EveryWrite).unwrap_err();
    assert!(matches!(err, DbError::InvalidPath(_)));
}

#[test]
fn test_open_directory_as_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let err = AofPersister::open(temp_dir.path(), SyncStrategy::EveryWrite).unwrap_err();
    assert!(matches!(err, DbError::Open { .. }));
}

#[test]
fn test_open_corrupted_log_fails() {
    let (_temp, path) = setup_temp_path();
    fs::write(&path, b"set\nb_1\nok\nnonsense\n").unwrap();

    let err = AofPersister::open(&path, SyncStrategy::EveryWrite).unwrap_err();

    assert!(err.is_corruption());
    assert!(err.to_string().contains("on line 4"));
}

#[test]
fn test_open_replays_existing_log() {
    let (_temp, path) = setup_temp_path();
    fs::write(&path, b"set\ntexts_1\nhello\nset\ntexts_2\nworld\ndel\ntexts_1\n").unwrap();

    let (aof, index) = AofPersister::open(&path, SyncStrategy::EveryWrite).unwrap();

    assert_eq!(index.record_count(), 1);
    assert_eq!(index.get("texts", 2).unwrap().as_ref(), b"world");
    assert_eq!(aof.size(), fs::metadata(&path).unwrap().len());
}

// =============================================================================
// Write Tests
// =============================================================================

#[test]
fn test_write_appends_frames() {
    let (_temp, path) = setup_temp_path();
    let (aof, _) = AofPersister::open(&path, SyncStrategy::EveryWrite).unwrap();

    aof.write(&encode_set("b", 1, b"one")).unwrap();
    aof.append(&LogEntry::del("b", 1)).unwrap();

    assert_eq!(fs::read(&path).unwrap(), b"set\nb_1\none\ndel\nb_1\n".to_vec());
    assert_eq!(aof.size(), 20);
}

#[test]
fn test_write_rejects_invalid_frame_without_touching_file() {
    let (_temp, path) = setup_temp_path();
    let (aof, _) = AofPersister::open(&path, SyncStrategy::EveryWrite).unwrap();
    aof.write(&encode_set("b", 1, b"one")).unwrap();

    let err = aof.write(b"set\nb_2\n").unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));
    assert!(err.to_string().contains("invalid set format"));

    let err = aof.write(b"del\nb_2\n\n").unwrap_err();
    assert!(err.to_string().contains("invalid delete format"));

    assert_eq!(fs::read(&path).unwrap(), b"set\nb_1\none\n".to_vec());
}

#[test]
fn test_write_after_close_fails() {
    let (_temp, path) = setup_temp_path();
    let (aof, _) = AofPersister::open(&path, SyncStrategy::EveryWrite).unwrap();
    aof.close().unwrap();

    let err = aof.write(&encode_del("b", 1)).unwrap_err();
    assert!(matches!(err, DbError::Closed(_)));
    assert!(matches!(aof.sync().unwrap_err(), DbError::Closed(_)));
}

#[test]
fn test_writes_survive_reopen() {
    let (_temp, path) = setup_temp_path();

    {
        let (aof, _) = AofPersister::open(&path, SyncStrategy::EveryWrite).unwrap();
        aof.write(&encode_set("b", 1, b"multi\nline")).unwrap();
        aof.write(&encode_set("b", 2, b"")).unwrap();
        aof.close().unwrap();
    }

    let (_aof, index) = AofPersister::open(&path, SyncStrategy::EveryWrite).unwrap();
    assert_eq!(index.get("b", 1).unwrap().as_ref(), b"multi\nline");
    assert_eq!(index.get("b", 2).unwrap().as_ref(), b"");
}

#[test]
fn test_drop_without_close_keeps_data() {
    let (_temp, path) = setup_temp_path();

    {
        let (aof, _) = AofPersister::open(&path, SyncStrategy::Interval { ms: 1000 }).unwrap();
        aof.write(&encode_set("b", 1, b"kept")).unwrap();
    }

    let (_aof, index) = AofPersister::open(&path, SyncStrategy::EveryWrite).unwrap();
    assert_eq!(index.get("b", 1).unwrap().as_ref(), b"kept");
}

// =============================================================================
// Flusher / Close Tests
// =============================================================================

#[test]
fn test_every_write_has_no_flusher() {
    let (_temp, path) = setup_temp_path();
    let (aof, _) = AofPersister::open(&path, SyncStrategy::EveryWrite).unwrap();
    assert!(!aof.is_flushing());
}

#[test]
fn test_interval_flusher_runs_until_close() {
    let (_temp, path) = setup_temp_path();
    let (aof, _) = AofPersister::open(&path, SyncStrategy::Interval { ms: 10 }).unwrap();

    assert!(aof.is_flushing());
    aof.write(&encode_set("b", 1, b"v")).unwrap();
    thread::sleep(std::time::Duration::from_millis(50));
    aof.sync().unwrap();

    aof.close().unwrap();
    assert!(!aof.is_flushing());
    assert!(!aof.is_open());
}

#[test]
fn test_close_with_long_interval_returns_promptly() {
    let (_temp, path) = setup_temp_path();
    let (aof, _) = AofPersister::open(&path, SyncStrategy::Interval { ms: 60_000 }).unwrap();

    let start = std::time::Instant::now();
    aof.close().unwrap();

    assert!(start.elapsed() < std::time::Duration::from_secs(5));
}

#[test]
fn test_close_is_idempotent() {
    let (_temp, path) = setup_temp_path();
    let (aof, _) = AofPersister::open(&path, SyncStrategy::Interval { ms: 5 }).unwrap();

    aof.close().unwrap();
    aof.close().unwrap();
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_direct_writes() {
    let (_temp, path) = setup_temp_path();
    let (aof, _) = AofPersister::open(&path, SyncStrategy::Interval { ms: 5 }).unwrap();
    let aof = Arc::new(aof);

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let aof = Arc::clone(&aof);
            thread::spawn(move || {
                aof.write(&encode_set("bucket", i, format!("value {i}").as_bytes())).unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    aof.close().unwrap();

    let (_aof, index) = AofPersister::open(&path, SyncStrategy::EveryWrite).unwrap();
    assert_eq!(index.bucket_count(), 1);
    assert_eq!(index.bucket("bucket").unwrap().len(), 10);
}
