//! Write-Ahead Log (WAL) for completed practices.
//!
//! Completion records are appended to a JSONL (JSON Lines) file with file
//! locking so that a CLI run and a rollup can share the same data dir.

use crate::{CompletionRecord, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Destination for finished practice records
pub trait CompletionSink {
    fn append(&mut self, record: &CompletionRecord) -> Result<()>;
}

/// JSONL-based completion sink with file locking
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl CompletionSink for JsonlSink {
    fn append(&mut self, record: &CompletionRecord) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(record)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        file.sync_data()?;

        file.unlock()?;

        tracing::debug!("Appended completion {} to WAL", record.session_id);
        Ok(())
    }
}

/// Read all completion records from a WAL file
///
/// Lines that fail to parse are logged and skipped.
pub fn read_completions(path: &Path) -> Result<Vec<CompletionRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut records = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<CompletionRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("Failed to parse completion at line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} completions from WAL", records.len());
    Ok(records)
}
