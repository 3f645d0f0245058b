//! Practice journal loading.
//!
//! Recent completions come from both the live WAL and the archived CSV.

use crate::rollup::CsvRow;
use crate::{CompletionRecord, Result};
use chrono::{Duration, Utc};
use csv::ReaderBuilder;
use std::collections::HashSet;
use std::path::Path;

/// Load completions from the last `days` days from both WAL and CSV
///
/// Returns records sorted by `completed_at`, newest first. A session that
/// appears in both files is returned once.
pub fn load_recent_completions(
    wal_path: &Path,
    csv_path: &Path,
    days: i64,
) -> Result<Vec<CompletionRecord>> {
    let cutoff = Utc::now() - Duration::days(days);
    let mut records = Vec::new();
    let mut seen_ids = HashSet::new();

    if wal_path.exists() {
        for record in crate::wal::read_completions(wal_path)? {
            if record.completed_at >= cutoff && seen_ids.insert(record.session_id.clone()) {
                records.push(record);
            }
        }
        tracing::debug!("Loaded {} completions from WAL", records.len());
    }

    if csv_path.exists() {
        let mut csv_count = 0;
        for record in load_completions_from_csv(csv_path)? {
            if record.completed_at >= cutoff && seen_ids.insert(record.session_id.clone()) {
                records.push(record);
                csv_count += 1;
            }
        }
        tracing::debug!("Loaded {} completions from CSV", csv_count);
    }

    records.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));

    tracing::info!(
        "Loaded {} completions from last {} days",
        records.len(),
        days
    );

    Ok(records)
}

fn load_completions_from_csv(path: &Path) -> Result<Vec<CompletionRecord>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;

    let mut records = Vec::new();
    for result in reader.deserialize::<CsvRow>() {
        match result {
            Ok(row) => match CompletionRecord::try_from(row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Failed to parse CSV row: {}", e),
            },
            Err(e) => tracing::warn!("Failed to deserialize CSV row: {}", e),
        }
    }

    Ok(records)
}
