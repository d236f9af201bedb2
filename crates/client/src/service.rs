use std::fmt;

use async_trait::async_trait;
use quiz_core::model::{
    AccessInfo, AnswerMap, Attempt, AttemptData, AttemptId, QuizId, SubmissionResult,
};

use crate::error::ServiceError;

/// Remote-call boundary to the assessment service.
///
/// Adapters own their own timeout, retry and auth policy; callers treat every
/// method as bounded.
#[async_trait]
pub trait AssessmentService: Send + Sync {
    /// Find an unfinished attempt of this quiz, if any.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if the lookup itself fails.
    async fn get_in_progress_attempt(&self, quiz_id: QuizId) -> Result<Option<Attempt>, ServiceError>;

    /// Start a brand-new attempt.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::AttemptStart` if the service refuses (e.g. access
    /// restrictions), or other service errors.
    async fn start_attempt(&self, quiz_id: QuizId) -> Result<Attempt, ServiceError>;

    /// Fetch one page of an attempt.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if the page cannot be loaded.
    async fn get_attempt_data(
        &self,
        attempt_id: AttemptId,
        page: usize,
    ) -> Result<AttemptData, ServiceError>;

    /// Persist answers without finishing the attempt. Safe to repeat.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if the answers were not stored.
    async fn save_attempt(&self, attempt_id: AttemptId, answers: &AnswerMap)
    -> Result<(), ServiceError>;

    /// Finalize the attempt with the given answers.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if the attempt was not finalized.
    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        answers: &AnswerMap,
    ) -> Result<SubmissionResult, ServiceError>;

    /// Informational access rules for the quiz.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` if the rules cannot be fetched.
    async fn get_access_info(&self, quiz_id: QuizId) -> Result<AccessInfo, ServiceError>;
}

/// Names of the service operations, used for call logs and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceOperation {
    GetInProgressAttempt,
    StartAttempt,
    GetAttemptData,
    SaveAttempt,
    SubmitAttempt,
    GetAccessInfo,
}

impl fmt::Display for ServiceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceOperation::GetInProgressAttempt => "get_in_progress_attempt",
            ServiceOperation::StartAttempt => "start_attempt",
            ServiceOperation::GetAttemptData => "get_attempt_data",
            ServiceOperation::SaveAttempt => "save_attempt",
            ServiceOperation::SubmitAttempt => "submit_attempt",
            ServiceOperation::GetAccessInfo => "get_access_info",
        };
        f.write_str(name)
    }
}
