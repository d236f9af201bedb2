//! Seams the host application plugs into the session.

use async_trait::async_trait;
use quiz_core::model::{AttemptId, SubmissionResult};

/// Destructive actions that need the user's explicit go-ahead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationRequest {
    Submit {
        attempt_id: AttemptId,
        /// Whether some answers have not been saved yet.
        unsaved_changes: bool,
    },
    Cancel {
        attempt_id: AttemptId,
    },
}

/// Asks the user to confirm a submit or cancel.
#[async_trait]
pub trait ConfirmationPort: Send + Sync {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool;
}

/// Answers every request the same way. Useful for scripted hosts and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedConfirmation(pub bool);

#[async_trait]
impl ConfirmationPort for FixedConfirmation {
    async fn confirm(&self, _request: &ConfirmationRequest) -> bool {
        self.0
    }
}

/// Outward events published by a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    /// An unfinished attempt was found and is being reopened.
    Resuming { attempt_id: AttemptId },
    /// Reopening failed; a fresh attempt will be started instead.
    ResumeFailed {
        attempt_id: Option<AttemptId>,
        reason: String,
    },
    Started {
        attempt_id: AttemptId,
        page: usize,
        resumed: bool,
    },
    PageChanged { page: usize },
    NavigationFailed { page: usize, reason: String },
    Saved,
    SaveFailed { reason: String },
    TimeWarning { remaining_seconds: u64 },
    TimeExpired,
    Submitted {
        result: SubmissionResult,
        automatic: bool,
    },
    SubmitFailed { reason: String, automatic: bool },
    Cancelled,
}
