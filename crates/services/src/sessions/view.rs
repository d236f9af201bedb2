use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use quiz_core::CountdownState;
use quiz_core::model::{AccessInfo, AttemptId, FieldValue, Question, QuizId};

use super::state::{AttemptSession, InFlightOperation, SessionState};

/// Read-only snapshot of a session, published after every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub attempt_id: AttemptId,
    pub quiz_id: QuizId,
    pub state: SessionState,
    pub current_page: usize,
    pub total_pages: usize,
    pub started_at: DateTime<Utc>,
    pub time_limit_seconds: Option<u64>,
    pub is_dirty: bool,
    pub last_autosave: Option<DateTime<Utc>>,
    pub in_flight: InFlightOperation,
    pub countdown: Option<CountdownState>,
    pub questions: Vec<Question>,
    pub fields: BTreeMap<String, FieldValue>,
    pub access: Option<AccessInfo>,
}

impl SessionView {
    pub(crate) fn capture(session: &AttemptSession, countdown: Option<CountdownState>) -> Self {
        Self {
            attempt_id: session.attempt_id(),
            quiz_id: session.quiz_id(),
            state: session.state(),
            current_page: session.current_page(),
            total_pages: session.total_pages(),
            started_at: session.started_at(),
            time_limit_seconds: session.time_limit_seconds(),
            is_dirty: session.is_dirty(),
            last_autosave: session.last_autosave(),
            in_flight: session.in_flight(),
            countdown,
            questions: session.cache().questions().to_vec(),
            fields: session.cache().fields().clone(),
            access: session.access().cloned(),
        }
    }

    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Seconds left on the clock, if the attempt is timed.
    #[must_use]
    pub fn time_remaining_seconds(&self) -> Option<u64> {
        self.countdown.map(|c| c.time_remaining_seconds)
    }
}
