//! Session state and its pure transitions.
//!
//! A `SessionState` is owned by exactly one controller. Every change goes
//! through `reduce(definition, state, action)`, which returns the next
//! state and never touches the network or the clock, so the wizard rules
//! can be tested without a runtime.

use crate::types::{AnswerValue, Answers, ExerciseDefinition, ProgressUpdate, SessionId, StepDefinition};

/// Where the session is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the practice API to hand out a session
    Uninitialized,
    /// Steps are being filled in and the clock is running
    Active,
    /// The clock has been stopped for good, steps can still be revisited
    Reviewing,
    /// Completion was accepted; nothing changes any more
    Completed,
}

/// Session data recovered from the practice API when starting
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resumption {
    pub session_id: Option<SessionId>,
    pub answers: Option<Answers>,
    pub elapsed_seconds: u64,
    /// Progress ordinal the session was last saved at
    pub progress: Option<u32>,
}

impl Resumption {
    /// A brand-new session with no remote identity (offline start)
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn fresh(session_id: SessionId) -> Self {
        Self {
            session_id: Some(session_id),
            ..Self::default()
        }
    }
}

/// Inputs to the session reducer
#[derive(Clone, Debug, PartialEq)]
pub enum SessionAction {
    Initialize(Resumption),
    RecordAnswer { field: String, value: AnswerValue },
    /// Move to a page; forward moves are gated on the current page
    Advance { target: usize },
    Back,
    Tick,
    SuspendTiming,
    MarkCompleted,
}

/// Why an autosave did not reach the practice API
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    NoSession,
    TerminalStep,
    Completed,
    Closed,
}

/// Result of pressing "back"
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackOutcome {
    Moved(usize),
    /// The host should leave the exercise
    Exit,
}

/// Everything a controller knows about one exercise attempt
#[derive(Clone, Debug, PartialEq)]
pub struct SessionState {
    pub session_id: Option<SessionId>,
    pub step_index: usize,
    pub answers: Answers,
    pub elapsed_seconds: u64,
    pub is_timing: bool,
    pub initialized: bool,
    pub completed: bool,
}

impl SessionState {
    pub fn new(definition: &ExerciseDefinition) -> Self {
        Self {
            session_id: None,
            step_index: 0,
            answers: definition.defaults.clone(),
            elapsed_seconds: 0,
            is_timing: true,
            initialized: false,
            completed: false,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.completed {
            Phase::Completed
        } else if !self.initialized {
            Phase::Uninitialized
        } else if self.is_timing {
            Phase::Active
        } else {
            Phase::Reviewing
        }
    }

    pub fn current_step<'a>(&self, definition: &'a ExerciseDefinition) -> Option<&'a StepDefinition> {
        definition.step(self.step_index)
    }

    /// Progress ordinal of the current page
    pub fn progress(&self, definition: &ExerciseDefinition) -> u32 {
        self.current_step(definition).map(|s| s.progress).unwrap_or(0)
    }

    pub fn at_terminal(&self, definition: &ExerciseDefinition) -> bool {
        self.current_step(definition)
            .map(|s| s.terminal)
            .unwrap_or(false)
    }

    /// Whether the current page's required fields are filled in
    pub fn can_advance(&self, definition: &ExerciseDefinition) -> bool {
        self.step_index < definition.last_index()
            && self
                .current_step(definition)
                .map(|s| s.requirement.is_satisfied(&self.answers))
                .unwrap_or(false)
    }

    pub fn back_outcome(&self, definition: &ExerciseDefinition) -> BackOutcome {
        if self.step_index == 0 || self.at_terminal(definition) {
            BackOutcome::Exit
        } else {
            BackOutcome::Moved(self.step_index - 1)
        }
    }

    /// Check whether an autosave may be sent right now
    pub fn autosave_gate(&self, definition: &ExerciseDefinition) -> Result<&SessionId, SkipReason> {
        if self.completed {
            return Err(SkipReason::Completed);
        }
        if self.at_terminal(definition) {
            return Err(SkipReason::TerminalStep);
        }
        self.session_id.as_ref().ok_or(SkipReason::NoSession)
    }

    /// Payload for the next autosave, if one is allowed
    pub fn progress_update(
        &self,
        definition: &ExerciseDefinition,
    ) -> Result<ProgressUpdate, SkipReason> {
        let session_id = self.autosave_gate(definition)?;
        Ok(ProgressUpdate {
            session_id: session_id.clone(),
            step: self.progress(definition),
            total_steps: definition.total_steps,
            answers: self.answers.clone(),
            elapsed_seconds: self.elapsed_seconds,
        })
    }
}

/// Apply one action to a session and return the resulting state
///
/// A completed session is frozen: every action returns it unchanged.
pub fn reduce(
    definition: &ExerciseDefinition,
    state: &SessionState,
    action: SessionAction,
) -> SessionState {
    if state.completed {
        return state.clone();
    }

    let mut next = state.clone();
    match action {
        SessionAction::Initialize(resumption) => {
            if state.initialized {
                tracing::debug!("Ignoring repeated initialization");
                return next;
            }
            next.session_id = resumption.session_id;
            if let Some(answers) = resumption.answers {
                next.answers = answers.merged_over(&definition.defaults);
                restore_score_defaults(definition, &mut next.answers);
            }
            next.elapsed_seconds = resumption.elapsed_seconds;
            if let Some(progress) = resumption.progress {
                next.step_index = definition.page_for_progress(progress);
            }
            next.is_timing = !definition
                .steps
                .iter()
                .take(next.step_index + 1)
                .any(|s| s.suspends_timing);
            next.initialized = true;
        }

        SessionAction::RecordAnswer { field, value } => {
            if definition.is_score_field(&field) && !matches!(value, AnswerValue::Number(_)) {
                tracing::debug!("Ignoring non-numeric write to score field {}", field);
                return next;
            }
            next.answers.set(field, value);
        }

        SessionAction::Advance { target } => {
            let target = target.min(definition.last_index());
            if target > state.step_index {
                if !state.can_advance(definition) {
                    return next;
                }
                // Skipped pages must be satisfied too
                let skipped_open = definition.steps[state.step_index + 1..target]
                    .iter()
                    .any(|s| !s.requirement.is_satisfied(&state.answers));
                if skipped_open {
                    return next;
                }
                let crosses_suspend = definition.steps[state.step_index + 1..=target]
                    .iter()
                    .any(|s| s.suspends_timing);
                if crosses_suspend {
                    next.is_timing = false;
                }
            }
            next.step_index = target;
        }

        SessionAction::Back => {
            if let BackOutcome::Moved(target) = state.back_outcome(definition) {
                next.step_index = target;
            }
        }

        SessionAction::Tick => {
            if state.initialized && state.is_timing {
                next.elapsed_seconds += 1;
            }
        }

        SessionAction::SuspendTiming => {
            next.is_timing = false;
        }

        SessionAction::MarkCompleted => {
            next.is_timing = false;
            next.completed = true;
        }
    }
    next
}

/// Score fields are never unset: anything but a number falls back to the default
fn restore_score_defaults(definition: &ExerciseDefinition, answers: &mut Answers) {
    for (field, default) in definition.defaults.iter() {
        if !definition.is_score_field(field) {
            continue;
        }
        if !matches!(answers.get(field), Some(AnswerValue::Number(_))) {
            answers.set(field.clone(), default.clone());
        }
    }
}
