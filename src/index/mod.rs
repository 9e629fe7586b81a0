//! Index Module
//!
//! The in-memory state of the store: bucket name → integer key → value.
//!
//! ## Responsibilities
//! - Single source of truth for reads (the log is never read after open)
//! - Implicit bucket lifecycle: created on first insert, removed with its
//!   last key, so a bucket is either absent or non-empty
//! - Deterministic enumeration for sorted reads and compaction
//!
//! ## Data Structure Choice
//! Nested `HashMap`s with `Bytes` values:
//! - O(1) point lookups, enumeration order is only needed on request
//! - Cloning a value or a bucket snapshot is a refcount bump, not a copy
//! - Locking lives one level up in `Store`, the index itself is plain data

mod table;

pub use table::{Bucket, Index};

use bytes::Bytes;

/// One record of a bucket, as returned by sorted enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortRecord {
    /// The record key
    pub key: i64,

    /// The stored value
    pub value: Bytes,
}
