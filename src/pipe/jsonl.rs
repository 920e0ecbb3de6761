//! JSON Lines file pipe
//!
//! Each record is one line. The file is opened in append mode so repeated
//! runs accumulate; downstream consumers apply records in file order.
//!
//! Writes are unbuffered and synced before `write` returns: sync markers are
//! committed before their record is emitted, so an accepted record must
//! already be on disk.

use super::{Pipe, Record};
use crate::{AgileSyncError, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Append-only JSONL sink
pub struct JsonlPipe {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlPipe {
    /// Open (or create) `path` for appending
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        tracing::info!(path = %path.display(), "Opened output pipe");
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Pipe for JsonlPipe {
    fn write(&self, record: Record) -> Result<()> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(&line)?;
        file.sync_data()?;
        Ok(())
    }
}

/// Read every record from a JSONL file, skipping blank lines
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .map_err(|e| AgileSyncError::Parse(format!("invalid JSONL at line {}: {}", n + 1, e)))?;
        records.push(record);
    }
    Ok(records)
}
