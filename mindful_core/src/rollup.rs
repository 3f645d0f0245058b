//! CSV rollup for archiving WAL completions.
//!
//! Completed practices accumulate in the JSONL WAL; a rollup moves them
//! into a CSV journal. The CSV is fsynced before the WAL is renamed so a
//! crash in between can at worst duplicate rows, which readers dedup by
//! session id.

use crate::types::{Answers, CompletionRecord, SessionId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::Path;

/// A row in the CSV journal. Answers are stored as a JSON object string.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CsvRow {
    session_id: String,
    exercise_type: String,
    completed_at: String,
    duration_minutes: u64,
    elapsed_seconds: u64,
    answers: String,
}

impl TryFrom<&CompletionRecord> for CsvRow {
    type Error = Error;

    fn try_from(record: &CompletionRecord) -> Result<Self> {
        Ok(CsvRow {
            session_id: record.session_id.to_string(),
            exercise_type: record.exercise_type.clone(),
            completed_at: record.completed_at.to_rfc3339(),
            duration_minutes: record.duration_minutes,
            elapsed_seconds: record.elapsed_seconds,
            answers: serde_json::to_string(&record.answers)?,
        })
    }
}

impl TryFrom<CsvRow> for CompletionRecord {
    type Error = Error;

    fn try_from(row: CsvRow) -> Result<Self> {
        let completed_at = DateTime::parse_from_rfc3339(&row.completed_at)
            .map_err(|e| Error::Other(format!("Invalid date: {}", e)))?
            .with_timezone(&Utc);
        let answers: Answers = if row.answers.trim().is_empty() {
            Answers::new()
        } else {
            serde_json::from_str(&row.answers)?
        };

        Ok(CompletionRecord {
            session_id: SessionId::new(row.session_id),
            exercise_type: row.exercise_type,
            completed_at,
            duration_minutes: row.duration_minutes,
            elapsed_seconds: row.elapsed_seconds,
            answers,
        })
    }
}

/// Roll up WAL completions into CSV and archive the WAL
///
/// Appends every WAL record to `csv_path` (writing headers when the file
/// is new), syncs the CSV, then renames the WAL to `*.wal.processed`.
/// Returns the number of records moved.
pub fn wal_to_csv_and_archive(wal_path: &Path, csv_path: &Path) -> Result<usize> {
    let records = crate::wal::read_completions(wal_path)?;

    if records.is_empty() {
        tracing::info!("No completions in WAL to roll up");
        return Ok(0);
    }

    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;

    let needs_headers = file.metadata()?.len() == 0;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    for record in &records {
        writer.serialize(CsvRow::try_from(record)?)?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::info!("Wrote {} completions to CSV", records.len());

    let processed_path = wal_path.with_extension("wal.processed");
    std::fs::rename(wal_path, &processed_path)?;

    tracing::info!("Archived WAL to {:?}", processed_path);

    Ok(records.len())
}

/// Remove every `*.processed` file in `dir`
pub fn cleanup_processed_wals(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "processed") {
            std::fs::remove_file(&path)?;
            tracing::debug!("Removed processed WAL: {:?}", path);
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Cleaned up {} processed WAL files", count);
    }

    Ok(count)
}
