//! Core domain types for the Mindful practice system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Exercise kinds and opaque session identifiers
//! - Answer values and the flat answer mapping
//! - Payloads exchanged with the practice API
//! - Completion records kept in the local journal

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Identity Types
// ============================================================================

/// Opaque identifier assigned by the practice API when a session starts
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Type of guided exercise
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    CognitiveReframing,
    GoodThingsJournal,
    SelfAwareness,
}

impl ExerciseKind {
    pub const ALL: [ExerciseKind; 3] = [
        ExerciseKind::CognitiveReframing,
        ExerciseKind::GoodThingsJournal,
        ExerciseKind::SelfAwareness,
    ];

    /// Stable label sent to the practice API as the exercise type
    pub fn label(&self) -> &'static str {
        match self {
            ExerciseKind::CognitiveReframing => "cognitive_reframing",
            ExerciseKind::GoodThingsJournal => "good_things_journal",
            ExerciseKind::SelfAwareness => "self_awareness",
        }
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Answer Types
// ============================================================================

/// A single user-entered value
///
/// Untagged so that answers stored by the API as plain JSON (`"text"`,
/// `["a", "b"]`, `5`, `null`) map onto variants directly. Anything else is
/// kept verbatim in `Other` rather than failing the whole mapping.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AnswerValue {
    Empty,
    Text(String),
    Number(i64),
    Selection(Vec<String>),
    Other(serde_json::Value),
}

impl AnswerValue {
    pub fn text(value: impl Into<String>) -> Self {
        AnswerValue::Text(value.into())
    }

    pub fn selection<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AnswerValue::Selection(items.into_iter().map(Into::into).collect())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_selection(&self) -> Option<&[String]> {
        match self {
            AnswerValue::Selection(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            AnswerValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// True for `Empty` and for text that is blank after trimming
    pub fn is_blank(&self) -> bool {
        match self {
            AnswerValue::Empty => true,
            AnswerValue::Text(s) => s.trim().is_empty(),
            AnswerValue::Selection(items) => items.is_empty(),
            AnswerValue::Number(_) => false,
            AnswerValue::Other(v) => v.is_null(),
        }
    }

    fn trimmed(&self) -> Self {
        match self {
            AnswerValue::Text(s) => AnswerValue::Text(s.trim().to_string()),
            AnswerValue::Selection(items) => AnswerValue::Selection(
                items
                    .iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// Flat mapping from field name to value
///
/// Backed by a `BTreeMap` so serialized payloads are deterministic; field
/// order carries no meaning.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Answers(BTreeMap<String, AnswerValue>);

impl Answers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&AnswerValue> {
        self.0.get(field)
    }

    /// Set a field, last write wins. Returns the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: AnswerValue) -> Option<AnswerValue> {
        self.0.insert(field.into(), value)
    }

    /// Builder-style variant of `set`
    pub fn with(mut self, field: impl Into<String>, value: AnswerValue) -> Self {
        self.set(field, value);
        self
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(AnswerValue::as_text)
    }

    pub fn selection(&self, field: &str) -> &[String] {
        self.get(field)
            .and_then(AnswerValue::as_selection)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AnswerValue)> {
        self.0.iter()
    }

    /// Overlay `self` onto `defaults`: fields present here win, fields only
    /// in `defaults` keep their default value.
    pub fn merged_over(&self, defaults: &Answers) -> Answers {
        let mut merged = defaults.clone();
        for (field, value) in &self.0 {
            merged.0.insert(field.clone(), value.clone());
        }
        merged
    }

    /// Copy with surrounding whitespace removed from text and selections
    pub fn trimmed(&self) -> Answers {
        Answers(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.trimmed()))
                .collect(),
        )
    }

    /// Parse answers from the opaque form the API hands back on resume.
    ///
    /// Accepts either a JSON object or a string holding a serialized JSON
    /// object. Returns `None` for anything else, including unparseable
    /// strings.
    pub fn from_raw(raw: &serde_json::Value) -> Option<Answers> {
        match raw {
            serde_json::Value::Object(_) => serde_json::from_value(raw.clone()).ok(),
            serde_json::Value::String(s) => serde_json::from_str(s).ok(),
            _ => None,
        }
    }
}

impl<K: Into<String>> FromIterator<(K, AnswerValue)> for Answers {
    fn from_iter<T: IntoIterator<Item = (K, AnswerValue)>>(iter: T) -> Self {
        Answers(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

// ============================================================================
// Practice API Payloads
// ============================================================================

/// Periodic progress push for an in-progress session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgressUpdate {
    pub session_id: SessionId,
    pub step: u32,
    pub total_steps: u32,
    pub answers: Answers,
    pub elapsed_seconds: u64,
}

/// Final submission when the user completes an exercise
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CompletionPayload {
    pub exercise_type: String,
    pub duration_minutes: u64,
    pub elapsed_seconds: u64,
    pub answers: Answers,
}

/// Whole minutes reported for a session: `max(1, ceil(seconds / 60))`
pub fn duration_minutes(elapsed_seconds: u64) -> u64 {
    elapsed_seconds.div_ceil(60).max(1)
}

// ============================================================================
// Journal Types
// ============================================================================

/// A completed practice as kept in the local journal
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CompletionRecord {
    pub session_id: SessionId,
    pub exercise_type: String,
    pub completed_at: DateTime<Utc>,
    pub duration_minutes: u64,
    pub elapsed_seconds: u64,
    pub answers: Answers,
}

// ============================================================================
// Exercise Definition Types
// ============================================================================

/// What must be filled in before a step lets the user move forward
#[derive(Clone, Debug, PartialEq)]
pub enum Requirement {
    /// Nothing required
    None,
    /// Free text that is not blank after trimming
    Text(String),
    /// A multi-select field with at least one entry
    Selection(String),
    /// A single-choice field that has been set
    Chosen(String),
    /// Any one of the nested requirements
    AnyOf(Vec<Requirement>),
}

impl Requirement {
    pub fn is_satisfied(&self, answers: &Answers) -> bool {
        match self {
            Requirement::None => true,
            Requirement::Text(field) => answers
                .text(field)
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false),
            Requirement::Selection(field) => !answers.selection(field).is_empty(),
            Requirement::Chosen(field) => answers
                .get(field)
                .map(|v| !v.is_blank())
                .unwrap_or(false),
            Requirement::AnyOf(options) => options.iter().any(|r| r.is_satisfied(answers)),
        }
    }

    /// Field names referenced by this requirement
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Requirement::None => vec![],
            Requirement::Text(f) | Requirement::Selection(f) | Requirement::Chosen(f) => {
                vec![f.as_str()]
            }
            Requirement::AnyOf(options) => options.iter().flat_map(|r| r.fields()).collect(),
        }
    }
}

/// How a host should collect input for a step
#[derive(Clone, Debug, PartialEq)]
pub enum StepInput {
    /// Read-only page (intro, breathing, review, completion)
    Info,
    Text {
        field: String,
    },
    MultiSelect {
        field: String,
        options: Vec<String>,
        allow_custom: bool,
    },
    SingleSelect {
        field: String,
        options: Vec<String>,
    },
    Score {
        field: String,
        min: i64,
        max: i64,
    },
}

/// One page of an exercise wizard
#[derive(Clone, Debug)]
pub struct StepDefinition {
    pub id: String,
    pub title: String,
    pub prompt: String,
    pub inputs: Vec<StepInput>,
    pub requirement: Requirement,
    /// Progress ordinal reported to the practice API for this page
    pub progress: u32,
    /// Entering this page stops the clock for the rest of the session
    pub suspends_timing: bool,
    /// The completion page; no autosave happens here
    pub terminal: bool,
}

/// A complete guided exercise definition
#[derive(Clone, Debug)]
pub struct ExerciseDefinition {
    pub kind: ExerciseKind,
    pub title: String,
    pub aliases: Vec<String>,
    pub steps: Vec<StepDefinition>,
    /// Logical step count reported to the practice API
    pub total_steps: u32,
    /// Initial answer shape; resumed answers are merged over it
    pub defaults: Answers,
    pub autosave_interval_secs: u64,
}

impl ExerciseDefinition {
    pub fn label(&self) -> &'static str {
        self.kind.label()
    }

    pub fn step(&self, index: usize) -> Option<&StepDefinition> {
        self.steps.get(index)
    }

    pub fn index_of(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }

    pub fn last_index(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    /// Whether `field` is collected by a score input on any page
    pub fn is_score_field(&self, field: &str) -> bool {
        self.steps
            .iter()
            .flat_map(|s| s.inputs.iter())
            .any(|input| matches!(input, StepInput::Score { field: f, .. } if f == field))
    }

    /// First page whose progress ordinal reaches `progress`, clamped to the
    /// last non-terminal page
    pub fn page_for_progress(&self, progress: u32) -> usize {
        let last_open = self
            .steps
            .iter()
            .rposition(|s| !s.terminal)
            .unwrap_or(0);
        self.steps
            .iter()
            .position(|s| s.progress >= progress)
            .unwrap_or(last_open)
            .min(last_open)
    }
}

/// The set of exercises a host can route to
#[derive(Clone, Debug)]
pub struct Catalog {
    pub exercises: Vec<ExerciseDefinition>,
}
