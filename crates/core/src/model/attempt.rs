use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{AttemptId, QuizId, RawQuestion};

/// Server-side lifecycle of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    InProgress,
    /// Time ran out but the attempt has not been finalized yet.
    Overdue,
    Finished,
    Abandoned,
}

impl AttemptState {
    /// Whether an attempt in this state can still be continued by the user.
    #[must_use]
    pub fn is_resumable(self) -> bool {
        matches!(self, AttemptState::InProgress | AttemptState::Overdue)
    }
}

/// One instance of a user taking a quiz, as tracked by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub quiz_id: QuizId,
    pub state: AttemptState,
    /// Page the user was last on, as recorded by the service.
    #[serde(default)]
    pub current_page: usize,
    pub total_pages: usize,
    pub started_at: DateTime<Utc>,
    /// `None` means the attempt is untimed.
    #[serde(default)]
    pub time_limit_seconds: Option<u64>,
}

/// A page of an attempt as returned by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptData {
    pub attempt: Attempt,
    pub questions: Vec<RawQuestion>,
    /// Service clock at the time of the response; used to correct local clock skew.
    #[serde(default)]
    pub server_time: Option<DateTime<Utc>>,
}

/// Informational access rules for a quiz. Not enforced locally.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessInfo {
    #[serde(default)]
    pub can_attempt: bool,
    #[serde(default)]
    pub prevent_messages: Vec<String>,
    /// Autosave period requested by the quiz, overriding the local default.
    #[serde(default)]
    pub autosave_period_seconds: Option<u64>,
}

/// Outcome of finalizing an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub attempt_id: AttemptId,
    pub state: AttemptState,
    #[serde(default)]
    pub grade: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
}
