//! The practice API boundary.
//!
//! Session identity, progress and completion records live behind
//! `PracticeApi`. The controller only ever talks to this trait, so the same
//! wizard runs against the HTTP service or the local file store.

use crate::session::Resumption;
use crate::types::{Answers, CompletionPayload, ProgressUpdate, SessionId};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

/// What the practice API returns when asked to start (or resume) a session
///
/// Resume fields are kept as raw JSON: services have been seen returning
/// answers both as objects and as serialized strings, and elapsed time as
/// numbers or numeric strings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StartedSession {
    pub session_id: Option<SessionId>,
    pub is_new: bool,
    pub resumed_answers: Option<Value>,
    pub resumed_elapsed_seconds: Option<Value>,
    pub resumed_step: Option<Value>,
}

impl StartedSession {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id: Some(session_id),
            is_new: true,
            ..Self::default()
        }
    }

    /// Turn the raw response into reducer input
    ///
    /// Unparseable answers fall back to none (defaults apply); a missing or
    /// non-numeric elapsed time becomes 0. A session flagged as new ignores
    /// any resume data it carries.
    pub fn into_resumption(self) -> Resumption {
        let Some(session_id) = self.session_id else {
            tracing::warn!("Practice API returned no session id, continuing offline");
            return Resumption::offline();
        };

        if self.is_new {
            return Resumption::fresh(session_id);
        }

        let answers = self.resumed_answers.as_ref().and_then(|raw| {
            let parsed = Answers::from_raw(raw);
            if parsed.is_none() && !raw.is_null() {
                tracing::warn!("Could not parse resumed answers, starting from defaults");
            }
            parsed
        });

        Resumption {
            session_id: Some(session_id),
            answers,
            elapsed_seconds: self
                .resumed_elapsed_seconds
                .as_ref()
                .and_then(non_negative_whole)
                .unwrap_or(0),
            progress: self
                .resumed_step
                .as_ref()
                .and_then(non_negative_whole)
                .map(|p| u32::try_from(p).unwrap_or(u32::MAX)),
        }
    }
}

/// Read a JSON number or numeric string as a whole, non-negative count
fn non_negative_whole(value: &Value) -> Option<u64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (n.is_finite() && n >= 0.0).then(|| n.floor() as u64)
}

/// Remote collaborator that owns session persistence
#[async_trait]
pub trait PracticeApi: Send + Sync {
    /// Start a session for an exercise type, or resume the open one
    async fn start_session(&self, exercise_type: &str) -> Result<StartedSession>;

    /// Push in-progress state
    async fn update_progress(&self, update: &ProgressUpdate) -> Result<()>;

    /// Record the finished session
    async fn complete_session(
        &self,
        session_id: &SessionId,
        payload: &CompletionPayload,
    ) -> Result<()>;
}
