//! Index implementation
//!
//! Nested HashMap keyed by bucket name, then by record key.

use std::collections::HashMap;

use bytes::Bytes;

use super::SortRecord;

/// Records of a single bucket
pub type Bucket = HashMap<i64, Bytes>;

/// In-memory index of every live record
///
/// Invariant: no bucket entry is ever empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Index {
    buckets: HashMap<String, Bucket>,
}

impl Index {
    /// Create a new empty Index
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by bucket and key
    pub fn get(&self, bucket: &str, key: i64) -> Option<&Bytes> {
        self.buckets.get(bucket)?.get(&key)
    }

    /// Insert or overwrite a record, creating the bucket if needed.
    ///
    /// Returns the previous value, if any.
    pub fn set(&mut self, bucket: &str, key: i64, value: Bytes) -> Option<Bytes> {
        match self.buckets.get_mut(bucket) {
            Some(records) => records.insert(key, value),
            None => {
                let mut records = Bucket::new();
                records.insert(key, value);
                self.buckets.insert(bucket.to_string(), records);
                None
            }
        }
    }

    /// Remove a record; the bucket goes away with its last key.
    ///
    /// Returns the removed value, or `None` if bucket or key was absent.
    pub fn remove(&mut self, bucket: &str, key: i64) -> Option<Bytes> {
        let records = self.buckets.get_mut(bucket)?;
        let removed = records.remove(&key)?;

        if records.is_empty() {
            self.buckets.remove(bucket);
        }

        Some(removed)
    }

    /// Whether a record exists
    pub fn contains(&self, bucket: &str, key: i64) -> bool {
        self.get(bucket, key).is_some()
    }

    /// All records of one bucket
    pub fn bucket(&self, bucket: &str) -> Option<&Bucket> {
        self.buckets.get(bucket)
    }

    /// Records of one bucket sorted ascending by key
    pub fn sorted(&self, bucket: &str) -> Option<Vec<SortRecord>> {
        let records = self.buckets.get(bucket)?;

        let mut sorted: Vec<SortRecord> = records
            .iter()
            .map(|(key, value)| SortRecord {
                key: *key,
                value: value.clone(),
            })
            .collect();
        sorted.sort_unstable_by_key(|record| record.key);

        Some(sorted)
    }

    /// One more than the largest key in the bucket, or 1 if the bucket is absent.
    ///
    /// `None` once the bucket holds `i64::MAX`, since no larger key exists.
    pub fn next_key(&self, bucket: &str) -> Option<i64> {
        match self.buckets.get(bucket).and_then(|records| records.keys().max()) {
            Some(max) => max.checked_add(1),
            None => Some(1),
        }
    }

    /// Total number of records across all buckets
    pub fn record_count(&self) -> usize {
        self.buckets.values().map(HashMap::len).sum()
    }

    /// Number of (non-empty) buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    /// Iterate over buckets in unspecified order
    pub fn buckets(&self) -> impl Iterator<Item = (&str, &Bucket)> {
        self.buckets.iter().map(|(name, records)| (name.as_str(), records))
    }

    /// Every record ordered by (bucket, key)
    ///
    /// Used when rewriting the log so that a compacted file is reproducible.
    pub fn records_sorted(&self) -> Vec<(&str, i64, &Bytes)> {
        let mut names: Vec<&String> = self.buckets.keys().collect();
        names.sort_unstable();

        let mut out = Vec::with_capacity(self.record_count());
        for name in names {
            let records = &self.buckets[name];
            let mut keys: Vec<&i64> = records.keys().collect();
            keys.sort_unstable();
            out.extend(keys.into_iter().map(|key| (name.as_str(), *key, &records[key])));
        }
        out
    }
}
