//! # BucketDB
//!
//! An embedded key-value store with:
//! - The authoritative data in memory (bucket → integer key → bytes)
//! - An optional append-only log (AOF) mirroring every mutation
//! - Crash recovery by validating and replaying the log on open
//! - Log compaction ("defrag") with a `.bak` rollback copy
//! - Single-writer/multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                               │
//! │        (RwLock: exclusive writers / shared readers)          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     AOF     │          │    Index    │
//!   │  (Append)   │          │ (in memory) │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │   Flusher   │
//!   │ (fsync tick)│
//!   └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use bucketdb::{Store, MEMORY_PATH};
//!
//! let store = Store::open(MEMORY_PATH, 0).unwrap();
//! store.set("texts", 1, "a text").unwrap();
//! assert_eq!(store.info(), "1 record(s) in 1 bucket(s)");
//!
//! assert!(store.del("texts", 1).unwrap());
//! assert_eq!(store.info(), "0 record(s) in 0 bucket(s)");
//! store.close().unwrap();
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod aof;
pub mod index;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{DbError, Result};
pub use config::{Config, SyncStrategy};
pub use index::{Index, SortRecord};
pub use store::{Store, StoreStats};
pub use aof::CompactionResult;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of BucketDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Path value that selects a memory-only store (no log file)
pub const MEMORY_PATH: &str = ":memory:";
