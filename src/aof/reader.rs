//! Log Reader
//!
//! Reads records from the log, one line at a time, checking the grammar as
//! it goes. Lines are handled as bytes so values need not be UTF-8.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::{DbError, Result};

use super::entry::{parse_key, unescape_value, LogEntry, DEL_KEYWORD, SET_KEYWORD};

/// Reads entries from a log
pub struct LogReader<R> {
    reader: R,
    /// Path used in error messages
    path: PathBuf,
    /// Number of the last line consumed (1-based)
    line: usize,
    /// Set once an error or EOF has been returned
    done: bool,
}

impl LogReader<BufReader<File>> {
    /// Open a log file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| DbError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufReader::new(file), path))
    }
}

impl<R: BufRead> LogReader<R> {
    /// Wrap any buffered reader; `path` only labels errors
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            path: path.into(),
            line: 0,
            done: false,
        }
    }

    /// Number of lines consumed so far
    pub fn lines_read(&self) -> usize {
        self.line
    }

    /// Read the next entry, with the line number its keyword sits on.
    ///
    /// Returns `Ok(None)` at a clean end of file.
    pub fn next_entry(&mut self) -> Result<Option<(usize, LogEntry)>> {
        let keyword = match self.read_line()? {
            Some(line) => line,
            None => return Ok(None),
        };
        let start = self.line;

        let entry = match keyword.as_slice() {
            SET_KEYWORD => {
                let key_field = self.require_line("incomplete set instruction")?;
                let key_line = self.line;
                let value = self.require_line("incomplete set instruction")?;

                let (bucket, key) = parse_key(&key_field).map_err(|reason| self.corruption(key_line, reason))?;
                LogEntry::Set {
                    bucket,
                    key,
                    value: Bytes::from(unescape_value(&value)),
                }
            }
            DEL_KEYWORD => {
                let key_field = self.require_line("incomplete del instruction")?;

                let (bucket, key) = parse_key(&key_field).map_err(|reason| self.corruption(self.line, reason))?;
                LogEntry::Del { bucket, key }
            }
            other => {
                let reason = format!("wrong instruction format '{}'", String::from_utf8_lossy(other));
                return Err(self.corruption(start, reason));
            }
        };

        Ok(Some((start, entry)))
    }

    /// Read one line without its terminating newline.
    ///
    /// A final line with no newline is a torn write and reported as corruption.
    fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf).map_err(|source| DbError::Open {
            path: self.path.clone(),
            source,
        })?;

        if n == 0 {
            return Ok(None);
        }

        self.line += 1;

        if buf.pop() != Some(b'\n') {
            return Err(self.corruption(self.line, "truncated line (missing newline)".to_string()));
        }

        Ok(Some(buf))
    }

    /// Read a line that must exist because a record is still open
    fn require_line(&mut self, reason: &str) -> Result<Vec<u8>> {
        match self.read_line()? {
            Some(line) => Ok(line),
            None => Err(self.corruption(self.line, reason.to_string())),
        }
    }

    fn corruption(&self, line: usize, reason: String) -> DbError {
        DbError::Corruption {
            path: self.path.clone(),
            line,
            reason,
        }
    }
}

impl<R: BufRead> Iterator for LogReader<R> {
    type Item = Result<(usize, LogEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.next_entry() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
