use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use quiz_core::Clock;
use quiz_core::model::{
    AccessInfo, AnswerMap, Attempt, AttemptData, AttemptId, AttemptState, QuizId, RawQuestion,
    SubmissionResult,
};

use crate::error::ServiceError;
use crate::service::{AssessmentService, ServiceOperation};

/// One recorded call, with the arguments that matter to tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    GetInProgressAttempt(QuizId),
    StartAttempt(QuizId),
    GetAttemptData { attempt_id: AttemptId, page: usize },
    SaveAttempt { attempt_id: AttemptId, answers: AnswerMap },
    SubmitAttempt { attempt_id: AttemptId, answers: AnswerMap },
    GetAccessInfo(QuizId),
}

impl ServiceCall {
    #[must_use]
    pub fn operation(&self) -> ServiceOperation {
        match self {
            ServiceCall::GetInProgressAttempt(_) => ServiceOperation::GetInProgressAttempt,
            ServiceCall::StartAttempt(_) => ServiceOperation::StartAttempt,
            ServiceCall::GetAttemptData { .. } => ServiceOperation::GetAttemptData,
            ServiceCall::SaveAttempt { .. } => ServiceOperation::SaveAttempt,
            ServiceCall::SubmitAttempt { .. } => ServiceOperation::SubmitAttempt,
            ServiceCall::GetAccessInfo(_) => ServiceOperation::GetAccessInfo,
        }
    }
}

/// A quiz known to the in-memory service.
#[derive(Debug, Clone, Default)]
pub struct QuizFixture {
    pub pages: Vec<Vec<RawQuestion>>,
    pub time_limit_seconds: Option<u64>,
    pub access: AccessInfo,
}

impl QuizFixture {
    #[must_use]
    pub fn new(pages: Vec<Vec<RawQuestion>>) -> Self {
        Self {
            pages,
            time_limit_seconds: None,
            access: AccessInfo {
                can_attempt: true,
                ..AccessInfo::default()
            },
        }
    }

    #[must_use]
    pub fn with_time_limit(mut self, seconds: u64) -> Self {
        self.time_limit_seconds = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_access(mut self, access: AccessInfo) -> Self {
        self.access = access;
        self
    }
}

#[derive(Debug, Clone)]
struct StoredAttempt {
    attempt: Attempt,
    saved: AnswerMap,
}

#[derive(Debug, Default)]
struct State {
    quizzes: HashMap<QuizId, QuizFixture>,
    attempts: BTreeMap<AttemptId, StoredAttempt>,
    next_attempt: u64,
    calls: Vec<ServiceCall>,
    failures: HashMap<ServiceOperation, u32>,
}

/// In-memory assessment service for tests and offline demos.
///
/// Records every call and can be told to fail the next N calls of an
/// operation.
#[derive(Clone)]
pub struct InMemoryAssessmentService {
    state: Arc<Mutex<State>>,
    clock: Clock,
    latency: Option<Duration>,
}

impl Default for InMemoryAssessmentService {
    fn default() -> Self {
        Self::new(Clock::default_clock())
    }
}

impl InMemoryAssessmentService {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                next_attempt: 1,
                ..State::default()
            })),
            clock,
            latency: None,
        }
    }

    /// Delay every call by `latency` (tokio time, so paused tests stay fast).
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn add_quiz(&self, quiz_id: QuizId, fixture: QuizFixture) {
        if let Ok(mut guard) = self.state.lock() {
            guard.quizzes.insert(quiz_id, fixture);
        }
    }

    /// Seed an attempt as if the user had started it earlier.
    pub fn add_attempt(&self, attempt: Attempt) {
        if let Ok(mut guard) = self.state.lock() {
            guard.next_attempt = guard.next_attempt.max(attempt.id.value() + 1);
            guard.attempts.insert(
                attempt.id,
                StoredAttempt {
                    attempt,
                    saved: AnswerMap::new(),
                },
            );
        }
    }

    /// Make the next `times` calls of `op` fail with a transient error.
    pub fn fail_next(&self, op: ServiceOperation, times: u32) {
        if let Ok(mut guard) = self.state.lock() {
            *guard.failures.entry(op).or_insert(0) += times;
        }
    }

    #[must_use]
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.state
            .lock()
            .map(|guard| guard.calls.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn count(&self, op: ServiceOperation) -> usize {
        self.calls().iter().filter(|c| c.operation() == op).count()
    }

    /// Answer maps of every `save_attempt` call, successful or not, in order.
    #[must_use]
    pub fn saves(&self) -> Vec<AnswerMap> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ServiceCall::SaveAttempt { answers, .. } => Some(answers),
                _ => None,
            })
            .collect()
    }

    /// Answer maps of every `submit_attempt` call, successful or not, in order.
    #[must_use]
    pub fn submits(&self) -> Vec<AnswerMap> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ServiceCall::SubmitAttempt { answers, .. } => Some(answers),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn attempt(&self, id: AttemptId) -> Option<Attempt> {
        self.state
            .lock()
            .ok()
            .and_then(|guard| guard.attempts.get(&id).map(|s| s.attempt.clone()))
    }

    /// Answers the service has stored for an attempt.
    #[must_use]
    pub fn saved_answers(&self, id: AttemptId) -> Option<AnswerMap> {
        self.state
            .lock()
            .ok()
            .and_then(|guard| guard.attempts.get(&id).map(|s| s.saved.clone()))
    }

    /// Record the call and consume an injected failure, if one is pending.
    async fn enter(&self, call: ServiceCall) -> Result<MutexGuard<'_, State>, ServiceError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut guard = self
            .state
            .lock()
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;
        let op = call.operation();
        guard.calls.push(call);
        if let Some(remaining) = guard.failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ServiceError::Unavailable(format!("injected {op} failure")));
            }
        }
        Ok(guard)
    }
}

#[async_trait]
impl AssessmentService for InMemoryAssessmentService {
    async fn get_in_progress_attempt(&self, quiz_id: QuizId) -> Result<Option<Attempt>, ServiceError> {
        let guard = self.enter(ServiceCall::GetInProgressAttempt(quiz_id)).await?;
        Ok(guard
            .attempts
            .values()
            .rev()
            .map(|stored| &stored.attempt)
            .find(|a| a.quiz_id == quiz_id && a.state.is_resumable())
            .cloned())
    }

    async fn start_attempt(&self, quiz_id: QuizId) -> Result<Attempt, ServiceError> {
        let mut guard = self.enter(ServiceCall::StartAttempt(quiz_id)).await?;
        let now = self.clock.now();
        let fixture = guard
            .quizzes
            .get(&quiz_id)
            .cloned()
            .ok_or(ServiceError::NotFound)?;
        if !fixture.access.can_attempt {
            let reason = fixture
                .access
                .prevent_messages
                .first()
                .cloned()
                .unwrap_or_else(|| "attempts are not allowed".into());
            return Err(ServiceError::AttemptStart(reason));
        }

        let id = AttemptId::new(guard.next_attempt);
        guard.next_attempt += 1;
        let attempt = Attempt {
            id,
            quiz_id,
            state: AttemptState::InProgress,
            current_page: 0,
            total_pages: fixture.pages.len(),
            started_at: now,
            time_limit_seconds: fixture.time_limit_seconds,
        };
        guard.attempts.insert(
            id,
            StoredAttempt {
                attempt: attempt.clone(),
                saved: AnswerMap::new(),
            },
        );
        Ok(attempt)
    }

    async fn get_attempt_data(
        &self,
        attempt_id: AttemptId,
        page: usize,
    ) -> Result<AttemptData, ServiceError> {
        let mut guard = self
            .enter(ServiceCall::GetAttemptData { attempt_id, page })
            .await?;
        let now = self.clock.now();
        let quiz_id = guard
            .attempts
            .get(&attempt_id)
            .map(|s| s.attempt.quiz_id)
            .ok_or(ServiceError::NotFound)?;
        let questions = guard
            .quizzes
            .get(&quiz_id)
            .and_then(|quiz| quiz.pages.get(page))
            .cloned()
            .ok_or(ServiceError::NotFound)?;
        let stored = guard
            .attempts
            .get_mut(&attempt_id)
            .ok_or(ServiceError::NotFound)?;
        stored.attempt.current_page = page;

        Ok(AttemptData {
            attempt: stored.attempt.clone(),
            questions,
            server_time: Some(now),
        })
    }

    async fn save_attempt(
        &self,
        attempt_id: AttemptId,
        answers: &AnswerMap,
    ) -> Result<(), ServiceError> {
        let mut guard = self
            .enter(ServiceCall::SaveAttempt {
                attempt_id,
                answers: answers.clone(),
            })
            .await?;
        let stored = guard
            .attempts
            .get_mut(&attempt_id)
            .ok_or(ServiceError::NotFound)?;
        if !stored.attempt.state.is_resumable() {
            return Err(ServiceError::Rejected {
                code: "attempt_closed".into(),
                message: format!("attempt {attempt_id} is no longer open"),
            });
        }
        stored.saved.extend(answers.clone());
        Ok(())
    }

    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        answers: &AnswerMap,
    ) -> Result<SubmissionResult, ServiceError> {
        let mut guard = self
            .enter(ServiceCall::SubmitAttempt {
                attempt_id,
                answers: answers.clone(),
            })
            .await?;
        let stored = guard
            .attempts
            .get_mut(&attempt_id)
            .ok_or(ServiceError::NotFound)?;
        if !stored.attempt.state.is_resumable() {
            return Err(ServiceError::Rejected {
                code: "attempt_closed".into(),
                message: format!("attempt {attempt_id} is no longer open"),
            });
        }
        stored.saved.extend(answers.clone());
        stored.attempt.state = AttemptState::Finished;

        Ok(SubmissionResult {
            attempt_id,
            state: AttemptState::Finished,
            grade: None,
            feedback: None,
        })
    }

    async fn get_access_info(&self, quiz_id: QuizId) -> Result<AccessInfo, ServiceError> {
        let guard = self.enter(ServiceCall::GetAccessInfo(quiz_id)).await?;
        guard
            .quizzes
            .get(&quiz_id)
            .map(|quiz| quiz.access.clone())
            .ok_or(ServiceError::NotFound)
    }
}
