//! Append-Only File (AOF) Module
//!
//! Provides durability by mirroring every mutation to a line-oriented log.
//!
//! ## Responsibilities
//! - Append validated entries before the index is mutated
//! - fsync per write or from a background flusher
//! - Validate and replay the log on open (corruption names the line)
//! - Compact the log on demand, keeping a `.bak` copy
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ set                                     │
//! │ <bucket>_<key>                          │
//! │ <value, newlines escaped as \n>         │
//! ├─────────────────────────────────────────┤
//! │ del                                     │
//! │ <bucket>_<key>                          │
//! ├─────────────────────────────────────────┤
//! │ ...                                     │
//! └─────────────────────────────────────────┘
//! ```

mod entry;
mod reader;
mod recovery;
mod flusher;
mod compaction;
mod persister;

pub use entry::{
    encode_del, encode_set, escape_value, format_key, parse_key, unescape_value, validate_frame,
    LogEntry, DEL_KEYWORD, DEL_LINES, SET_KEYWORD, SET_LINES,
};
pub use reader::LogReader;
pub use recovery::{LogRecovery, RecoveryResult};
pub use flusher::{start_flusher, FlushHandle};
pub use compaction::{backup_path, checksum_file, make_backup, CompactionResult, BACKUP_SUFFIX};
pub use persister::AofPersister;
