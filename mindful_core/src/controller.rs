//! Wizard session controller.
//!
//! `PracticeSession` drives one exercise attempt: it asks the practice API
//! for a session, keeps the local `SessionState` in step with user input,
//! runs the one-second clock and the periodic autosave as background tasks,
//! and submits the completion record.
//!
//! Remote failures never escape as panics or unhandled errors:
//! initialization fails open, autosave reports a `SaveOutcome`, and
//! completion returns a `CompletionError` while keeping the answers.

use crate::api::PracticeApi;
use crate::session::{reduce, BackOutcome, Phase, Resumption, SessionAction, SessionState, SkipReason};
use crate::types::{
    duration_minutes, AnswerValue, CompletionPayload, ExerciseDefinition, SessionId, StepDefinition,
};
use crate::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// How often the clock ticks and progress is pushed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cadence {
    pub tick: Duration,
    pub autosave: Duration,
}

impl Cadence {
    /// One-second clock plus the exercise's own autosave interval
    pub fn for_exercise(definition: &ExerciseDefinition) -> Self {
        Self {
            tick: Duration::from_secs(1),
            autosave: Duration::from_secs(definition.autosave_interval_secs),
        }
    }

    pub fn with_autosave(mut self, autosave: Duration) -> Self {
        self.autosave = autosave;
        self
    }

    /// Each tick counts as one elapsed second whatever its period
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }
}

/// How `initialize` ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InitOutcome {
    Fresh,
    Resumed,
    /// The practice API could not be reached; the session runs locally
    Offline(String),
}

/// Result of one autosave attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Skipped(SkipReason),
    /// The push failed; the next interval tries again
    Failed(String),
}

/// Why `complete` did not record the session
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("session is not on its completion step")]
    NotAtCompletion,
    #[error("session was already completed")]
    AlreadyCompleted,
    #[error("no remote session to complete")]
    NoSession,
    #[error("completion was not recorded, answers are kept for a retry: {0}")]
    Remote(#[source] Error),
}

/// Proof that the practice API accepted the completion
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionReceipt {
    pub session_id: SessionId,
    pub payload: CompletionPayload,
}

/// Where the host goes once the user leaves the completion page
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExitRoute {
    Home,
    /// The journal of finished practices, optionally highlighting one
    Journal { highlight: Option<SessionId> },
}

impl ExitRoute {
    /// Navigation proceeds whether or not completion succeeded
    pub fn after_completion(result: &Result<CompletionReceipt, CompletionError>) -> Self {
        match result {
            Ok(receipt) => ExitRoute::Journal {
                highlight: Some(receipt.session_id.clone()),
            },
            Err(_) => ExitRoute::Journal { highlight: None },
        }
    }
}

/// State shared between the controller and its timer tasks
struct Shared {
    definition: Arc<ExerciseDefinition>,
    state: Mutex<SessionState>,
    alive: AtomicBool,
}

impl Shared {
    fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Apply an action unless the session has been torn down
    fn apply(&self, action: SessionAction) -> Option<SessionState> {
        if !self.is_alive() {
            tracing::debug!("Session closed, dropping {:?}", action);
            return None;
        }
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let next = reduce(&self.definition, &guard, action);
        *guard = next.clone();
        Some(next)
    }
}

/// Controller for one guided exercise attempt
pub struct PracticeSession {
    shared: Arc<Shared>,
    api: Arc<dyn PracticeApi>,
    cadence: Cadence,
    init: Option<InitOutcome>,
    tasks: Vec<JoinHandle<()>>,
}

impl PracticeSession {
    /// Create an uninitialized controller; call `initialize` before use
    pub fn new(
        definition: Arc<ExerciseDefinition>,
        api: Arc<dyn PracticeApi>,
        cadence: Cadence,
    ) -> Self {
        let state = SessionState::new(&definition);
        Self {
            shared: Arc::new(Shared {
                definition,
                state: Mutex::new(state),
                alive: AtomicBool::new(true),
            }),
            api,
            cadence,
            init: None,
            tasks: Vec::new(),
        }
    }

    /// Create and initialize in one step
    pub async fn start(
        definition: Arc<ExerciseDefinition>,
        api: Arc<dyn PracticeApi>,
        cadence: Cadence,
    ) -> Self {
        let mut session = Self::new(definition, api, cadence);
        session.initialize().await;
        session
    }

    /// Obtain a session from the practice API and start the clock
    ///
    /// Never fails: if the API is unreachable the session continues with
    /// an empty local state and no remote identity.
    pub async fn initialize(&mut self) -> InitOutcome {
        if let Some(outcome) = &self.init {
            return outcome.clone();
        }

        let label = self.shared.definition.label();
        let (resumption, outcome) = match self.api.start_session(label).await {
            Ok(started) => {
                let is_new = started.is_new;
                let resumption = started.into_resumption();
                let outcome = if resumption.session_id.is_none() {
                    InitOutcome::Offline("no session id returned".into())
                } else if is_new {
                    InitOutcome::Fresh
                } else {
                    InitOutcome::Resumed
                };
                (resumption, outcome)
            }
            Err(e) => {
                tracing::warn!("Failed to start {} session: {}. Continuing offline.", label, e);
                (Resumption::offline(), InitOutcome::Offline(e.to_string()))
            }
        };

        if let Some(state) = self.shared.apply(SessionAction::Initialize(resumption)) {
            tracing::info!(
                "Started {} session {:?} at step {} ({}s elapsed)",
                label,
                state.session_id.as_ref().map(SessionId::as_str),
                state.step_index,
                state.elapsed_seconds
            );
            self.spawn_timers();
        }

        self.init = Some(outcome.clone());
        outcome
    }

    fn spawn_timers(&mut self) {
        let shared = Arc::clone(&self.shared);
        let tick_every = self.cadence.tick.max(Duration::from_millis(1));
        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Consume the immediate first tick
            interval.tick().await;
            loop {
                interval.tick().await;
                match shared.apply(SessionAction::Tick) {
                    Some(state) if state.is_timing && !state.completed => {}
                    _ => break,
                }
            }
            tracing::debug!("Session clock stopped");
        }));

        let shared = Arc::clone(&self.shared);
        let api = Arc::clone(&self.api);
        let save_every = self.cadence.autosave.max(Duration::from_millis(1));
        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(save_every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                let outcome = push_progress(&shared, api.as_ref()).await;
                if matches!(
                    outcome,
                    SaveOutcome::Skipped(SkipReason::Completed | SkipReason::Closed)
                ) {
                    break;
                }
            }
            tracing::debug!("Autosave stopped");
        }));
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn definition(&self) -> &ExerciseDefinition {
        &self.shared.definition
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> SessionState {
        self.shared.read(SessionState::clone)
    }

    pub fn phase(&self) -> Phase {
        self.shared.read(SessionState::phase)
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.shared.read(|s| s.session_id.clone())
    }

    pub fn step_index(&self) -> usize {
        self.shared.read(|s| s.step_index)
    }

    pub fn current_step(&self) -> Option<&StepDefinition> {
        self.shared.definition.step(self.step_index())
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.shared.read(|s| s.elapsed_seconds)
    }

    /// Whether "next" is enabled on the current page
    pub fn can_advance(&self) -> bool {
        self.shared.read(|s| s.can_advance(&self.shared.definition))
    }

    // ------------------------------------------------------------------
    // User actions
    // ------------------------------------------------------------------

    pub fn record_answer(&self, field: impl Into<String>, value: AnswerValue) {
        self.shared.apply(SessionAction::RecordAnswer {
            field: field.into(),
            value,
        });
    }

    /// Move to `target`. Forward moves need the current page to be
    /// satisfied; returns whether the page changed.
    pub fn advance(&self, target: usize) -> bool {
        let before = self.step_index();
        self.shared
            .apply(SessionAction::Advance { target })
            .map(|s| s.step_index != before)
            .unwrap_or(false)
    }

    /// Move to the next page
    pub fn next(&self) -> bool {
        self.advance(self.step_index() + 1)
    }

    pub fn back(&self) -> BackOutcome {
        let outcome = self
            .shared
            .read(|s| s.back_outcome(&self.shared.definition));
        if let BackOutcome::Moved(_) = outcome {
            self.shared.apply(SessionAction::Back);
        }
        outcome
    }

    /// Stop the clock for the rest of the session
    pub fn suspend_timing(&self) {
        self.shared.apply(SessionAction::SuspendTiming);
    }

    /// Advance the clock by one second if it is running
    pub fn tick(&self) {
        self.shared.apply(SessionAction::Tick);
    }

    // ------------------------------------------------------------------
    // Remote synchronization
    // ------------------------------------------------------------------

    /// Push current progress to the practice API now
    pub async fn autosave(&self) -> SaveOutcome {
        push_progress(&self.shared, self.api.as_ref()).await
    }

    /// Submit the finished session
    ///
    /// Only allowed on the completion page. On success the session is
    /// frozen and its timers stop; on failure nothing changes locally so
    /// the caller can retry.
    pub async fn complete(&self) -> Result<CompletionReceipt, CompletionError> {
        let definition = &self.shared.definition;
        let (session_id, payload) = self.shared.read(|state| {
            if state.completed {
                return Err(CompletionError::AlreadyCompleted);
            }
            if !state.at_terminal(definition) {
                return Err(CompletionError::NotAtCompletion);
            }
            let session_id = state.session_id.clone().ok_or(CompletionError::NoSession)?;

            let mut answers = state.answers.trimmed();
            answers.set(
                "timestamp",
                AnswerValue::Number(chrono::Utc::now().timestamp_millis()),
            );
            let payload = CompletionPayload {
                exercise_type: definition.label().to_string(),
                duration_minutes: duration_minutes(state.elapsed_seconds),
                elapsed_seconds: state.elapsed_seconds,
                answers,
            };
            Ok((session_id, payload))
        })?;

        if let Err(e) = self.api.complete_session(&session_id, &payload).await {
            tracing::error!("Failed to complete session {}: {}", session_id, e);
            return Err(CompletionError::Remote(e));
        }

        if self.shared.apply(SessionAction::MarkCompleted).is_none() {
            tracing::debug!("Completion for {} acknowledged after close", session_id);
        }
        for task in &self.tasks {
            task.abort();
        }
        tracing::info!(
            "Completed {} session {} ({} min)",
            payload.exercise_type,
            session_id,
            payload.duration_minutes
        );

        Ok(CompletionReceipt {
            session_id,
            payload,
        })
    }

    /// Tear down: stop timers and ignore anything that arrives later
    pub fn close(&mut self) {
        self.shared.alive.store(false, Ordering::SeqCst);
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for PracticeSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Best-effort progress push; never returns an error
async fn push_progress(shared: &Shared, api: &dyn PracticeApi) -> SaveOutcome {
    if !shared.is_alive() {
        return SaveOutcome::Skipped(SkipReason::Closed);
    }
    let update = match shared.read(|s| s.progress_update(&shared.definition)) {
        Ok(update) => update,
        Err(reason) => return SaveOutcome::Skipped(reason),
    };

    match api.update_progress(&update).await {
        Ok(()) => {
            if shared.is_alive() {
                tracing::debug!(
                    "Saved progress for {} at step {}/{}",
                    update.session_id,
                    update.step,
                    update.total_steps
                );
            }
            SaveOutcome::Saved
        }
        Err(e) => {
            tracing::warn!("Failed to save progress for {}: {}", update.session_id, e);
            SaveOutcome::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StartedSession;
    use crate::catalog::build_default_catalog;
    use crate::types::{Answers, ExerciseKind, ProgressUpdate};
    use async_trait::async_trait;
    use serde_json::json;

    /// In-memory practice API that records every call
    #[derive(Default)]
    struct RecordingApi {
        start: Option<StartedSession>,
        fail_updates: AtomicBool,
        fail_completions: AtomicBool,
        updates: Mutex<Vec<ProgressUpdate>>,
        completions: Mutex<Vec<(SessionId, CompletionPayload)>>,
    }

    impl RecordingApi {
        fn fresh() -> Self {
            Self {
                start: Some(StartedSession::new(SessionId::new("p-1"))),
                ..Self::default()
            }
        }

        fn unreachable() -> Self {
            Self::default()
        }

        fn resuming(answers: serde_json::Value, elapsed: serde_json::Value, step: u32) -> Self {
            Self {
                start: Some(StartedSession {
                    session_id: Some(SessionId::new("p-7")),
                    is_new: false,
                    resumed_answers: Some(answers),
                    resumed_elapsed_seconds: Some(elapsed),
                    resumed_step: Some(json!(step)),
                }),
                ..Self::default()
            }
        }

        fn update_count(&self) -> usize {
            self.updates.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PracticeApi for RecordingApi {
        async fn start_session(&self, _exercise_type: &str) -> crate::Result<StartedSession> {
            self.start
                .clone()
                .ok_or_else(|| Error::Other("connection refused".into()))
        }

        async fn update_progress(&self, update: &ProgressUpdate) -> crate::Result<()> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(Error::Api {
                    status: 503,
                    message: "unavailable".into(),
                });
            }
            self.updates.lock().unwrap().push(update.clone());
            Ok(())
        }

        async fn complete_session(
            &self,
            session_id: &SessionId,
            payload: &CompletionPayload,
        ) -> crate::Result<()> {
            if self.fail_completions.load(Ordering::SeqCst) {
                return Err(Error::Api {
                    status: 500,
                    message: "boom".into(),
                });
            }
            self.completions
                .lock()
                .unwrap()
                .push((session_id.clone(), payload.clone()));
            Ok(())
        }
    }

    fn definition(kind: ExerciseKind) -> Arc<ExerciseDefinition> {
        Arc::new(build_default_catalog().get(kind).cloned().unwrap())
    }

    async fn start(kind: ExerciseKind, api: &Arc<RecordingApi>) -> PracticeSession {
        let def = definition(kind);
        let cadence = Cadence::for_exercise(&def);
        PracticeSession::start(def, api.clone(), cadence).await
    }

    /// Fill in every required field of the journal and walk to its end
    fn finish_journal(session: &PracticeSession) {
        session.record_answer("good_thing", AnswerValue::text("  a kind message "));
        session.record_answer("emotions", AnswerValue::selection(["grateful"]));
        session.record_answer("reason", AnswerValue::text("I noticed it"));
        while session.next() {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_fresh_session() {
        crate::logging::init_test();
        let api = Arc::new(RecordingApi::fresh());
        let session = start(ExerciseKind::GoodThingsJournal, &api).await;

        assert_eq!(session.phase(), Phase::Active);
        assert_eq!(session.session_id(), Some(SessionId::new("p-1")));
        assert_eq!(session.step_index(), 0);
        assert_eq!(session.elapsed_seconds(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_fails_open() {
        let api = Arc::new(RecordingApi::unreachable());
        let def = definition(ExerciseKind::GoodThingsJournal);
        let mut session = PracticeSession::new(def.clone(), api.clone(), Cadence::for_exercise(&def));

        let outcome = session.initialize().await;
        assert!(matches!(outcome, InitOutcome::Offline(_)));
        assert_eq!(session.phase(), Phase::Active);
        assert_eq!(session.session_id(), None);

        assert_eq!(
            session.autosave().await,
            SaveOutcome::Skipped(SkipReason::NoSession)
        );
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(api.update_count(), 0);
        // The clock still runs for an offline session
        assert!(session.elapsed_seconds() >= 24);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_round_trip() {
        let api = Arc::new(RecordingApi::resuming(json!({ "event": "x" }), json!(42), 3));
        let session = start(ExerciseKind::CognitiveReframing, &api).await;

        let state = session.snapshot();
        assert_eq!(state.progress(session.definition()), 3);
        assert_eq!(state.elapsed_seconds, 42);
        assert_eq!(state.answers.text("event"), Some("x"));
        assert_eq!(
            state.answers,
            Answers::new()
                .with("event", AnswerValue::text("x"))
                .merged_over(&session.definition().defaults)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_ticks_every_second() {
        let api = Arc::new(RecordingApi::fresh());
        let session = start(ExerciseKind::GoodThingsJournal, &api).await;

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(session.elapsed_seconds(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspended_clock_stays_put() {
        let api = Arc::new(RecordingApi::fresh());
        let session = start(ExerciseKind::CognitiveReframing, &api).await;

        session.record_answer("event", AnswerValue::text("missed the train"));
        session.record_answer("thought", AnswerValue::text("I always mess up"));
        session.record_answer("emotions", AnswerValue::selection(["anxious"]));
        session.record_answer("new_perspective", AnswerValue::text("trains run every 10 min"));
        session.record_answer("selected_action", AnswerValue::text("breathe"));
        let review = session.definition().index_of("review").unwrap();
        while session.step_index() < review {
            assert!(session.next(), "stuck at {}", session.step_index());
        }
        assert_eq!(session.phase(), Phase::Reviewing);

        let frozen = session.elapsed_seconds();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(session.elapsed_seconds(), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_on_interval() {
        let api = Arc::new(RecordingApi::fresh());
        let session = start(ExerciseKind::GoodThingsJournal, &api).await;
        session.record_answer("good_thing", AnswerValue::text("sunshine"));

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        let updates = api.updates.lock().unwrap().clone();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].total_steps, 4);
        assert_eq!(updates[0].answers.text("good_thing"), Some("sunshine"));
        // The tenth tick and the first save are due at the same instant
        assert!(matches!(updates[0].elapsed_seconds, 9 | 10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_legacy_cadence_saves_every_second() {
        let api = Arc::new(RecordingApi::fresh());
        let _session = start(ExerciseKind::SelfAwareness, &api).await;

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(api.update_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_twice_sends_identical_payloads() {
        let api = Arc::new(RecordingApi::fresh());
        let session = start(ExerciseKind::GoodThingsJournal, &api).await;
        session.record_answer("good_thing", AnswerValue::text("tea"));

        assert_eq!(session.autosave().await, SaveOutcome::Saved);
        assert_eq!(session.autosave().await, SaveOutcome::Saved);

        let updates = api.updates.lock().unwrap().clone();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0], updates[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_failure_is_reported_not_raised() {
        let api = Arc::new(RecordingApi::fresh());
        let session = start(ExerciseKind::GoodThingsJournal, &api).await;
        api.fail_updates.store(true, Ordering::SeqCst);

        assert!(matches!(session.autosave().await, SaveOutcome::Failed(_)));

        // Next interval retries once the API is back
        api.fail_updates.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(api.update_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_autosave_on_terminal_step() {
        let api = Arc::new(RecordingApi::fresh());
        let session = start(ExerciseKind::GoodThingsJournal, &api).await;
        finish_journal(&session);
        assert!(session.current_step().unwrap().terminal);

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(api.update_count(), 0);
        assert_eq!(
            session.autosave().await,
            SaveOutcome::Skipped(SkipReason::TerminalStep)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_with_zero_seconds_reports_one_minute() {
        let api = Arc::new(RecordingApi::fresh());
        let session = start(ExerciseKind::GoodThingsJournal, &api).await;
        finish_journal(&session);

        let receipt = session.complete().await.unwrap();
        assert_eq!(receipt.payload.elapsed_seconds, 0);
        assert_eq!(receipt.payload.duration_minutes, 1);
        assert_eq!(receipt.payload.exercise_type, "good_things_journal");
        assert_eq!(session.phase(), Phase::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_with_sixty_one_seconds_reports_two_minutes() {
        let api = Arc::new(RecordingApi::resuming(json!({}), json!(61), 0));
        let session = start(ExerciseKind::GoodThingsJournal, &api).await;
        finish_journal(&session);

        let receipt = session.complete().await.unwrap();
        assert_eq!(receipt.payload.elapsed_seconds, 61);
        assert_eq!(receipt.payload.duration_minutes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_trims_answers_and_stamps_time() {
        let api = Arc::new(RecordingApi::fresh());
        let session = start(ExerciseKind::GoodThingsJournal, &api).await;
        finish_journal(&session);

        session.complete().await.unwrap();

        let completions = api.completions.lock().unwrap().clone();
        assert_eq!(completions.len(), 1);
        let (id, payload) = &completions[0];
        assert_eq!(id, &SessionId::new("p-1"));
        assert_eq!(payload.answers.text("good_thing"), Some("a kind message"));
        assert!(payload.answers.get("timestamp").unwrap().as_number().unwrap() > 0);
        assert_eq!(payload.answers.get("post_score"), Some(&AnswerValue::Number(8)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_outside_completion_step_is_rejected() {
        let api = Arc::new(RecordingApi::fresh());
        let session = start(ExerciseKind::GoodThingsJournal, &api).await;

        let result = session.complete().await;
        assert!(matches!(result, Err(CompletionError::NotAtCompletion)));
        assert!(api.completions.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_completion_keeps_data_for_retry() {
        let api = Arc::new(RecordingApi::fresh());
        let session = start(ExerciseKind::GoodThingsJournal, &api).await;
        finish_journal(&session);
        api.fail_completions.store(true, Ordering::SeqCst);

        let result = session.complete().await;
        assert!(matches!(result, Err(CompletionError::Remote(_))));
        assert_eq!(
            ExitRoute::after_completion(&result),
            ExitRoute::Journal { highlight: None }
        );
        assert_ne!(session.phase(), Phase::Completed);
        assert_eq!(session.snapshot().answers.text("reason"), Some("I noticed it"));

        api.fail_completions.store(false, Ordering::SeqCst);
        let retry = session.complete().await;
        assert_eq!(
            ExitRoute::after_completion(&retry),
            ExitRoute::Journal {
                highlight: Some(SessionId::new("p-1"))
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_session_ignores_edits() {
        let api = Arc::new(RecordingApi::fresh());
        let session = start(ExerciseKind::GoodThingsJournal, &api).await;
        finish_journal(&session);
        session.complete().await.unwrap();

        session.record_answer("reason", AnswerValue::text("edited later"));
        assert_eq!(session.snapshot().answers.text("reason"), Some("I noticed it"));
        assert_eq!(
            session.autosave().await,
            SaveOutcome::Skipped(SkipReason::Completed)
        );
        assert!(matches!(
            session.complete().await,
            Err(CompletionError::AlreadyCompleted)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_timers_and_mutations() {
        let api = Arc::new(RecordingApi::fresh());
        let mut session = start(ExerciseKind::SelfAwareness, &api).await;

        tokio::time::sleep(Duration::from_millis(2500)).await;
        session.close();
        let elapsed = session.elapsed_seconds();
        let saves = api.update_count();

        tokio::time::sleep(Duration::from_secs(10)).await;
        session.record_answer("event", AnswerValue::text("after close"));

        assert_eq!(session.elapsed_seconds(), elapsed);
        assert_eq!(api.update_count(), saves);
        assert_eq!(session.snapshot().answers.text("event"), Some(""));
        assert_eq!(
            session.autosave().await,
            SaveOutcome::Skipped(SkipReason::Closed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_advance_leaves_state_unchanged() {
        let api = Arc::new(RecordingApi::fresh());
        let session = start(ExerciseKind::CognitiveReframing, &api).await;
        let event = session.definition().index_of("event").unwrap();
        assert!(session.advance(event));

        session.record_answer("event", AnswerValue::text("   "));
        let before = session.snapshot();
        assert!(!session.can_advance());
        assert!(!session.next());
        assert_eq!(session.snapshot(), before);

        session.record_answer("event", AnswerValue::text("ok"));
        assert!(session.next());
        assert_eq!(session.step_index(), event + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_from_first_and_completion_pages_exits() {
        let api = Arc::new(RecordingApi::fresh());
        let session = start(ExerciseKind::GoodThingsJournal, &api).await;
        assert_eq!(session.back(), BackOutcome::Exit);

        assert!(session.next());
        assert_eq!(session.back(), BackOutcome::Moved(0));

        finish_journal(&session);
        let at = session.step_index();
        assert_eq!(session.back(), BackOutcome::Exit);
        assert_eq!(session.step_index(), at);
    }
}
