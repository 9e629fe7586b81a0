//! Tests for defrag / compaction
//!
//! These tests verify:
//! - The rewritten log holds exactly one set per live record
//! - Replaying the compacted log gives back the same index
//! - The `.bak` file is a byte-exact copy of the pre-defrag log
//! - Writes keep working after a defrag

use std::fs;
use std::path::PathBuf;

use bucketdb::aof::{
    backup_path, checksum_file, encode_del, encode_set, make_backup, AofPersister, LogRecovery,
};
use bucketdb::error::CompactionStage;
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

fn line_count(path: &PathBuf) -> usize {
    fs::read(path).unwrap().iter().filter(|&&b| b == b'\n').count()
}

/// Write a history with overwrites and deletes, return the replayed index
fn write_history(aof: &AofPersister, path: &PathBuf) -> bucketdb::Index {
    for i in 0..20 {
        aof.write(&encode_set("texts", i, format!("v{i}").as_bytes())).unwrap();
    }
    for i in 0..10 {
        aof.write(&encode_set("texts", i, format!("line\nv{i}-2").as_bytes())).unwrap();
    }
    for i in 10..15 {
        aof.write(&encode_del("texts", i)).unwrap();
    }
    aof.write(&encode_set("gone", 1, b"x")).unwrap();
    aof.write(&encode_del("gone", 1)).unwrap();
    aof.sync().unwrap();

    LogRecovery::replay(path).unwrap().0
}

// =============================================================================
// Backup Tests
// =============================================================================

#[test]
fn test_backup_path_appends_suffix() {
    assert_eq!(backup_path(&PathBuf::from("/data/db.aof")), PathBuf::from("/data/db.aof.bak"));
}

#[test]
fn test_make_backup_is_byte_exact() {
    let (_temp, path) = setup_temp_path();
    let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    fs::write(&path, &content).unwrap();

    let (backup, copied) = make_backup(&path).unwrap();

    assert_eq!(copied, content.len() as u64);
    assert_eq!(fs::read(&backup).unwrap(), content);
    assert_eq!(checksum_file(&backup).unwrap(), checksum_file(&path).unwrap());
}

#[test]
fn test_make_backup_of_missing_file_fails() {
    let (_temp, path) = setup_temp_path();
    let err = make_backup(&path).unwrap_err();
    assert!(err.to_string().contains("backup"));
}

// =============================================================================
// Defrag Tests
// =============================================================================

#[test]
fn test_defrag_writes_one_set_per_record() {
    let (_temp, path) = setup_temp_path();
    let (aof, _) = AofPersister::open(&path, SyncStrategy::EveryWrite).unwrap();
    let index = write_history(&aof, &path);
    let before = fs::read(&path).unwrap();

    let result = aof.defrag(&index).unwrap();

    assert_eq!(result.records, 15);
    assert_eq!(index.record_count(), 15);
    assert_eq!(line_count(&path), 3 * 15);
    assert_eq!(result.bytes_before, before.len() as u64);
    assert_eq!(result.bytes_after, fs::metadata(&path).unwrap().len());
    assert!(result.bytes_saved() > 0);

    let content = fs::read(&path).unwrap();
    assert!(!content.windows(4).any(|w| w == b"del\n"));
}

#[test]
fn test_defrag_replay_equivalence() {
    let (_temp, path) = setup_temp_path();
    let (aof, _) = AofPersister::open(&path, SyncStrategy::EveryWrite).unwrap();
    let index = write_history(&aof, &path);

    aof.defrag(&index).unwrap();
    aof.close().unwrap();

    let (_aof, replayed) = AofPersister::open(&path, SyncStrategy::EveryWrite).unwrap();
    assert_eq!(replayed, index);
}

#[test]
fn test_defrag_keeps_backup_of_previous_log() {
    let (_temp, path) = setup_temp_path();
    let (aof, _) = AofPersister::open(&path, SyncStrategy::Interval { ms: 5 }).unwrap();
    let index = write_history(&aof, &path);
    let before = fs::read(&path).unwrap();

    let result = aof.defrag(&index).unwrap();

    assert_eq!(result.backup_path, backup_path(&path));
    assert_eq!(fs::read(&result.backup_path).unwrap(), before);
}

#[test]
fn test_defrag_output_is_deterministic() {
    let (_temp, path) = setup_temp_path();
    let (aof, _) = AofPersister::open(&path, SyncStrategy::EveryWrite).unwrap();
    let index = write_history(&aof, &path);

    aof.defrag(&index).unwrap();
    let first = fs::read(&path).unwrap();
    aof.defrag(&index).unwrap();

    assert_eq!(fs::read(&path).unwrap(), first);
}

#[test]
fn test_defrag_restarts_flusher_and_accepts_writes() {
    let (_temp, path) = setup_temp_path();
    let (aof, _) = AofPersister::open(&path, SyncStrategy::Interval { ms: 5 }).unwrap();
    let index = write_history(&aof, &path);

    aof.defrag(&index).unwrap();

    assert!(aof.is_open());
    assert!(aof.is_flushing());
    aof.write(&encode_set("after", 1, b"defrag")).unwrap();
    aof.close().unwrap();

    let (_aof, replayed) = AofPersister::open(&path, SyncStrategy::EveryWrite).unwrap();
    assert_eq!(replayed.record_count(), 16);
    assert_eq!(replayed.get("after", 1).unwrap().as_ref(), b"defrag");
}

#[test]
fn test_defrag_of_empty_index_empties_log() {
    let (_temp, path) = setup_temp_path();
    let (aof, _) = AofPersister::open(&path, SyncStrategy::EveryWrite).unwrap();
    aof.write(&encode_set("b", 1, b"x")).unwrap();
    aof.write(&encode_del("b", 1)).unwrap();

    let result = aof.defrag(&bucketdb::Index::new()).unwrap();

    assert_eq!(result.records, 0);
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);
}

#[test]
fn test_defrag_after_close_fails_and_keeps_backup() {
    let (_temp, path) = setup_temp_path();
    let (aof, _) = AofPersister::open(&path, SyncStrategy::Interval { ms: 5 }).unwrap();
    aof.write(&encode_set("b", 1, b"x")).unwrap();
    aof.close().unwrap();
    fs::write(backup_path(&path), b"previous backup").unwrap();

    let err = aof.defrag(&bucketdb::Index::new()).unwrap_err();

    assert!(matches!(
        err,
        DbError::Compaction { stage: CompactionStage::Close, .. }
    ));
    assert!(!aof.is_open());
    assert!(!aof.is_flushing());
    assert_eq!(fs::read(backup_path(&path)).unwrap(), b"previous backup".to_vec());
    assert_eq!(fs::read(&path).unwrap(), b"set\nb_1\nx\n".to_vec());
}
