//! Log entry definitions
//!
//! Framing, escaping and grammar checks for individual log records.
//!
//! ```text
//! set\n<bucket>_<key>\n<escaped value>\n
//! del\n<bucket>_<key>\n
//! ```
//!
//! The key field is split on its *last* underscore, so bucket names may
//! contain underscores. The key itself must be a canonical non-negative
//! decimal integer: ASCII digits only, no sign, no leading zeros.

use bytes::Bytes;

use crate::error::{DbError, Result};
use crate::index::Index;

/// Keyword line of a set record
pub const SET_KEYWORD: &[u8] = b"set";

/// Keyword line of a del record
pub const DEL_KEYWORD: &[u8] = b"del";

/// Lines per set record (keyword, key, value)
pub const SET_LINES: usize = 3;

/// Lines per del record (keyword, key)
pub const DEL_LINES: usize = 2;

/// A single state transition in the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// Insert or overwrite `bucket[key] = value`
    Set {
        bucket: String,
        key: i64,
        value: Bytes,
    },

    /// Remove `bucket[key]`
    Del { bucket: String, key: i64 },
}

impl LogEntry {
    pub fn set(bucket: impl Into<String>, key: i64, value: impl Into<Bytes>) -> Self {
        LogEntry::Set {
            bucket: bucket.into(),
            key,
            value: value.into(),
        }
    }

    pub fn del(bucket: impl Into<String>, key: i64) -> Self {
        LogEntry::Del {
            bucket: bucket.into(),
            key,
        }
    }

    pub fn bucket(&self) -> &str {
        match self {
            LogEntry::Set { bucket, .. } | LogEntry::Del { bucket, .. } => bucket,
        }
    }

    pub fn key(&self) -> i64 {
        match self {
            LogEntry::Set { key, .. } | LogEntry::Del { key, .. } => *key,
        }
    }

    /// Number of lines this entry occupies in the log
    pub fn line_count(&self) -> usize {
        match self {
            LogEntry::Set { .. } => SET_LINES,
            LogEntry::Del { .. } => DEL_LINES,
        }
    }

    /// Encode to the on-disk frame
    pub fn encode(&self) -> Vec<u8> {
        match self {
            LogEntry::Set { bucket, key, value } => encode_set(bucket, *key, value),
            LogEntry::Del { bucket, key } => encode_del(bucket, *key),
        }
    }

    /// Fold this entry into an index (replay semantics)
    pub fn apply(self, index: &mut Index) {
        match self {
            LogEntry::Set { bucket, key, value } => {
                index.set(&bucket, key, value);
            }
            LogEntry::Del { bucket, key } => {
                index.remove(&bucket, key);
            }
        }
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a set record without building a `LogEntry`
pub fn encode_set(bucket: &str, key: i64, value: &[u8]) -> Vec<u8> {
    let escaped = escape_value(value);
    let key_field = format_key(bucket, key);

    let mut frame = Vec::with_capacity(SET_KEYWORD.len() + key_field.len() + escaped.len() + 3);
    frame.extend_from_slice(SET_KEYWORD);
    frame.push(b'\n');
    frame.extend_from_slice(key_field.as_bytes());
    frame.push(b'\n');
    frame.extend_from_slice(&escaped);
    frame.push(b'\n');
    frame
}

/// Encode a del record without building a `LogEntry`
pub fn encode_del(bucket: &str, key: i64) -> Vec<u8> {
    let key_field = format_key(bucket, key);

    let mut frame = Vec::with_capacity(DEL_KEYWORD.len() + key_field.len() + 2);
    frame.extend_from_slice(DEL_KEYWORD);
    frame.push(b'\n');
    frame.extend_from_slice(key_field.as_bytes());
    frame.push(b'\n');
    frame
}

/// Join bucket and key into the key field: `<bucket>_<key>`
pub fn format_key(bucket: &str, key: i64) -> String {
    format!("{}_{}", bucket, key)
}

/// Replace every newline byte with the two bytes `\` `n`
pub fn escape_value(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for &byte in value {
        if byte == b'\n' {
            out.extend_from_slice(b"\\n");
        } else {
            out.push(byte);
        }
    }
    out
}

/// Turn every `\` `n` pair back into a newline byte.
///
/// A value that originally contained the two bytes `\n` also decodes to a
/// newline; the format has no escape for the backslash itself.
pub fn unescape_value(line: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len());
    let mut i = 0;
    while i < line.len() {
        if line[i] == b'\\' && line.get(i + 1) == Some(&b'n') {
            out.push(b'\n');
            i += 2;
        } else {
            out.push(line[i]);
            i += 1;
        }
    }
    out
}

// =============================================================================
// Parsing / Validation
// =============================================================================

/// Parse a key field `<bucket>_<key>`, splitting on the last underscore.
///
/// Returns a human-readable reason on failure.
pub fn parse_key(field: &[u8]) -> std::result::Result<(String, i64), String> {
    let field = std::str::from_utf8(field)
        .map_err(|_| format!("invalid key format (not UTF-8): '{}'", String::from_utf8_lossy(field)))?;

    let (bucket, digits) = field
        .rsplit_once('_')
        .ok_or_else(|| format!("invalid key format (no underscore): '{}'", field))?;

    if bucket.is_empty() {
        return Err(format!("invalid key format (empty bucket name): '{}'", field));
    }

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid key format (ID not a number): '{}'", field));
    }

    if digits.len() > 1 && digits.starts_with('0') {
        return Err(format!("invalid key format (ID has leading zeros): '{}'", field));
    }

    let key = digits
        .parse::<i64>()
        .map_err(|e| format!("invalid key format (ID out of range): '{}': {}", field, e))?;

    Ok((bucket.to_string(), key))
}

/// Check a complete encoded frame against the log grammar before it is
/// appended: right keyword, exact line count, parseable key field.
pub fn validate_frame(frame: &[u8]) -> Result<()> {
    let body = frame.strip_suffix(b"\n").ok_or_else(|| {
        DbError::Validation(format!(
            "entry must end with a newline, got '{}'",
            printable(frame)
        ))
    })?;

    let lines: Vec<&[u8]> = body.split(|&b| b == b'\n').collect();

    let expected = match lines[0] {
        SET_KEYWORD => SET_LINES,
        DEL_KEYWORD => DEL_LINES,
        other => {
            return Err(DbError::Validation(format!(
                "invalid command: '{}'",
                String::from_utf8_lossy(other)
            )))
        }
    };

    if lines.len() != expected {
        let name = if expected == SET_LINES { "set" } else { "delete" };
        let shape = if expected == SET_LINES { "set\\nkey\\nvalue\\n" } else { "del\\nkey\\n" };
        return Err(DbError::Validation(format!(
            "invalid {} format: expected '{}', got '{}'",
            name,
            shape,
            printable(frame)
        )));
    }

    parse_key(lines[1]).map_err(DbError::Validation)?;

    Ok(())
}

/// Render a frame on one line for error messages
fn printable(frame: &[u8]) -> String {
    String::from_utf8_lossy(frame).replace('\n', "\\n")
}
