//! Local practice store.
//!
//! Implements `PracticeApi` on top of the data directory so exercises can
//! be run without a practice service:
//!
//! - `progress.json` holds one in-progress session per exercise type
//! - `practice_sessions.wal` receives a JSON line per completed session
//!
//! Progress is written atomically (temp file, fsync, rename) under an
//! exclusive lock. A corrupted progress file is treated as empty.

use crate::api::{PracticeApi, StartedSession};
use crate::types::{Answers, CompletionPayload, CompletionRecord, ProgressUpdate, SessionId};
use crate::wal::{CompletionSink, JsonlSink};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use uuid::Uuid;

pub const PROGRESS_FILE: &str = "progress.json";
pub const WAL_FILE: &str = "practice_sessions.wal";
pub const CSV_FILE: &str = "practice_sessions.csv";

/// Last saved state of an unfinished session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SavedProgress {
    pub session_id: SessionId,
    pub step: u32,
    pub total_steps: u32,
    #[serde(default)]
    pub answers: Answers,
    #[serde(default)]
    pub elapsed_seconds: u64,
    pub updated_at: DateTime<Utc>,
}

/// Contents of `progress.json`, keyed by exercise type
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressBook {
    #[serde(default)]
    pub sessions: BTreeMap<String, SavedProgress>,
}

impl ProgressBook {
    /// Load with a shared lock
    ///
    /// A missing file is an empty book. An unreadable or corrupted file is
    /// logged and also treated as empty.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No progress file at {:?}", path);
            return Ok(Self::default());
        }

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("Unable to open progress file {:?}: {}. Starting fresh.", path, e);
                return Ok(Self::default());
            }
        };

        if let Err(e) = file.lock_shared() {
            tracing::warn!("Unable to lock progress file {:?}: {}. Starting fresh.", path, e);
            return Ok(Self::default());
        }

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(&file);
        if let Err(e) = reader.read_to_string(&mut contents) {
            let _ = file.unlock();
            tracing::warn!("Failed to read progress file {:?}: {}. Starting fresh.", path, e);
            return Ok(Self::default());
        }

        file.unlock()?;

        match serde_json::from_str::<ProgressBook>(&contents) {
            Ok(book) => Ok(book),
            Err(e) => {
                tracing::warn!("Failed to parse progress file {:?}: {}. Starting fresh.", path, e);
                Ok(Self::default())
            }
        }
    }

    /// Atomically replace the file: temp file, fsync, rename
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::Other(format!("progress path {:?} has no parent", path)))?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string(self)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved {} in-progress sessions to {:?}", self.sessions.len(), path);
        Ok(())
    }

    /// Load, modify and save back
    pub fn update<F, T>(path: &Path, f: F) -> Result<T>
    where
        F: FnOnce(&mut ProgressBook) -> Result<T>,
    {
        let mut book = Self::load(path)?;
        let out = f(&mut book)?;
        book.save(path)?;
        Ok(out)
    }

    fn find_mut(&mut self, session_id: &SessionId) -> Option<&mut SavedProgress> {
        self.sessions
            .values_mut()
            .find(|saved| &saved.session_id == session_id)
    }
}

/// `PracticeApi` backed by files in a data directory
pub struct LocalPracticeStore {
    data_dir: PathBuf,
    // Serializes load-modify-save cycles within this process
    guard: Arc<Mutex<()>>,
}

impl LocalPracticeStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn progress_path(&self) -> PathBuf {
        self.data_dir.join(PROGRESS_FILE)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE)
    }

    /// Sessions that were started but not completed
    pub fn in_progress(&self) -> Result<ProgressBook> {
        ProgressBook::load(&self.progress_path())
    }

    /// Run one load-modify-save cycle on the blocking pool
    async fn with_book<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ProgressBook) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = Arc::clone(&self.guard);
        let path = self.progress_path();
        tokio::task::spawn_blocking(move || {
            let _held = guard.lock().unwrap_or_else(|e| e.into_inner());
            ProgressBook::update(&path, f)
        })
        .await
        .map_err(|e| Error::Other(format!("progress update task failed: {}", e)))?
    }
}

#[async_trait]
impl PracticeApi for LocalPracticeStore {
    async fn start_session(&self, exercise_type: &str) -> Result<StartedSession> {
        let exercise_type = exercise_type.to_string();
        self.with_book(move |book| {
            if let Some(saved) = book.sessions.get(&exercise_type) {
                tracing::info!(
                    "Resuming {} session {} at step {}",
                    exercise_type,
                    saved.session_id,
                    saved.step
                );
                return Ok(StartedSession {
                    session_id: Some(saved.session_id.clone()),
                    is_new: false,
                    resumed_answers: Some(serde_json::to_value(&saved.answers)?),
                    resumed_elapsed_seconds: Some(saved.elapsed_seconds.into()),
                    resumed_step: Some(saved.step.into()),
                });
            }

            let session_id = SessionId::new(Uuid::new_v4().to_string());
            book.sessions.insert(
                exercise_type.clone(),
                SavedProgress {
                    session_id: session_id.clone(),
                    step: 0,
                    total_steps: 0,
                    answers: Answers::new(),
                    elapsed_seconds: 0,
                    updated_at: Utc::now(),
                },
            );
            tracing::info!("Started {} session {}", exercise_type, session_id);
            Ok(StartedSession::new(session_id))
        })
        .await
    }

    async fn update_progress(&self, update: &ProgressUpdate) -> Result<()> {
        let update = update.clone();
        self.with_book(move |book| {
            let saved = book.find_mut(&update.session_id).ok_or_else(|| {
                Error::Session(format!("unknown session {}", update.session_id))
            })?;
            saved.step = update.step;
            saved.total_steps = update.total_steps;
            saved.answers = update.answers;
            saved.elapsed_seconds = update.elapsed_seconds;
            saved.updated_at = Utc::now();
            Ok(())
        })
        .await
    }

    async fn complete_session(
        &self,
        session_id: &SessionId,
        payload: &CompletionPayload,
    ) -> Result<()> {
        let record = CompletionRecord {
            session_id: session_id.clone(),
            exercise_type: payload.exercise_type.clone(),
            completed_at: Utc::now(),
            duration_minutes: payload.duration_minutes,
            elapsed_seconds: payload.elapsed_seconds,
            answers: payload.answers.clone(),
        };

        let exercise_type = record.exercise_type.clone();
        let mut sink = JsonlSink::new(self.wal_path());
        let completed = session_id.clone();
        self.with_book(move |book| {
            sink.append(&record)?;
            book.sessions.retain(|_, saved| saved.session_id != completed);
            Ok(())
        })
        .await?;

        tracing::info!("Recorded completion of {} session {}", exercise_type, session_id);
        Ok(())
    }
}
