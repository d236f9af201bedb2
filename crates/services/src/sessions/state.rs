use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use quiz_core::PageCache;
use quiz_core::model::{AccessInfo, AnswerMap, Attempt, AttemptId, FieldValue, QuizId};

use crate::error::SessionError;

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Active,
    PageLoading,
    Autosaving,
    Submitting,
    Submitted,
    Cancelled,
    Failed,
}

impl SessionState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Submitted | SessionState::Cancelled | SessionState::Failed
        )
    }
}

/// The single service call a session may have outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InFlightOperation {
    #[default]
    None,
    LoadingPage,
    Autosaving,
    Submitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Active,
    Submitted,
    Cancelled,
}

/// Answers collected for a save or submit, tagged with the edit revision they
/// reflect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Collected {
    pub answers: AnswerMap,
    pub revision: u64,
}

/// One live attempt: identity, page position, unsaved edits and the in-flight
/// slot.
///
/// Only the session actor touches this, so every transition below runs
/// serialized.
#[derive(Debug, Clone)]
pub(crate) struct AttemptSession {
    attempt_id: AttemptId,
    quiz_id: QuizId,
    lifecycle: Lifecycle,
    total_pages: usize,
    started_at: DateTime<Utc>,
    time_limit_seconds: Option<u64>,
    is_dirty: bool,
    revision: u64,
    last_autosave: Option<DateTime<Utc>>,
    in_flight: InFlightOperation,
    cache: PageCache,
    // pages left with unsaved edits, keyed by page index
    stashed: BTreeMap<usize, PageCache>,
    access: Option<AccessInfo>,
}

impl AttemptSession {
    pub(crate) fn new(attempt: &Attempt, cache: PageCache, access: Option<AccessInfo>) -> Self {
        Self {
            attempt_id: attempt.id,
            quiz_id: attempt.quiz_id,
            lifecycle: Lifecycle::Active,
            total_pages: attempt.total_pages,
            started_at: attempt.started_at,
            time_limit_seconds: attempt.time_limit_seconds,
            is_dirty: false,
            revision: 0,
            last_autosave: None,
            in_flight: InFlightOperation::None,
            cache,
            stashed: BTreeMap::new(),
            access,
        }
    }

    pub(crate) fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    pub(crate) fn quiz_id(&self) -> QuizId {
        self.quiz_id
    }

    pub(crate) fn current_page(&self) -> usize {
        self.cache.page_index()
    }

    pub(crate) fn total_pages(&self) -> usize {
        self.total_pages
    }

    pub(crate) fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub(crate) fn time_limit_seconds(&self) -> Option<u64> {
        self.time_limit_seconds
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub(crate) fn last_autosave(&self) -> Option<DateTime<Utc>> {
        self.last_autosave
    }

    pub(crate) fn in_flight(&self) -> InFlightOperation {
        self.in_flight
    }

    pub(crate) fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub(crate) fn access(&self) -> Option<&AccessInfo> {
        self.access.as_ref()
    }

    pub(crate) fn state(&self) -> SessionState {
        match self.lifecycle {
            Lifecycle::Submitted => SessionState::Submitted,
            Lifecycle::Cancelled => SessionState::Cancelled,
            Lifecycle::Active => match self.in_flight {
                InFlightOperation::None => SessionState::Active,
                InFlightOperation::LoadingPage => SessionState::PageLoading,
                InFlightOperation::Autosaving => SessionState::Autosaving,
                InFlightOperation::Submitting => SessionState::Submitting,
            },
        }
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.lifecycle != Lifecycle::Active
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_terminal() {
            return Err(SessionError::Finalized(self.state()));
        }
        Ok(())
    }

    /// Claim the in-flight slot.
    pub(crate) fn begin(&mut self, op: InFlightOperation) -> Result<(), SessionError> {
        self.ensure_open()?;
        if self.in_flight != InFlightOperation::None {
            return Err(SessionError::Busy(self.in_flight));
        }
        self.in_flight = op;
        Ok(())
    }

    pub(crate) fn finish(&mut self) {
        self.in_flight = InFlightOperation::None;
    }

    /// Apply one edit to the current page. Rejected edits leave the session
    /// untouched.
    pub(crate) fn record_edit(&mut self, key: &str, value: FieldValue) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.cache.apply(key, value)?;
        self.is_dirty = true;
        self.revision += 1;
        Ok(())
    }

    /// Everything not yet acknowledged: stashed pages in page order, then the
    /// current page.
    pub(crate) fn collect(&self) -> Collected {
        let mut answers = AnswerMap::new();
        for cache in self.stashed.values() {
            answers.extend(cache.collect());
        }
        answers.extend(self.cache.collect());
        Collected {
            answers,
            revision: self.revision,
        }
    }

    /// A save covering `revision` succeeded.
    pub(crate) fn mark_saved(&mut self, revision: u64, at: DateTime<Utc>) {
        self.last_autosave = Some(at);
        self.acknowledge(revision);
    }

    fn acknowledge(&mut self, revision: u64) {
        if revision == self.revision {
            self.is_dirty = false;
            self.stashed.clear();
        }
    }

    /// Swap in a freshly loaded page.
    pub(crate) fn replace_page(&mut self, mut cache: PageCache, attempt: &Attempt) {
        let previous = std::mem::take(&mut self.cache);
        if self.is_dirty {
            self.stashed.insert(previous.page_index(), previous);
        }
        if let Some(stashed) = self.stashed.remove(&cache.page_index()) {
            cache.adopt_fields(&stashed);
        }
        self.cache = cache;
        if attempt.total_pages > 0 {
            self.total_pages = attempt.total_pages;
        }
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.lifecycle = Lifecycle::Submitted;
        self.in_flight = InFlightOperation::None;
        self.is_dirty = false;
        self.stashed.clear();
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.lifecycle = Lifecycle::Cancelled;
        self.in_flight = InFlightOperation::None;
    }
}
