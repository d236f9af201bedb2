//! Shared error types for the services crate.

use assessment_client::ServiceError;
use quiz_core::cache::CacheError;
use quiz_core::model::{AttemptId, QuizId};
use thiserror::Error;

use crate::sessions::{InFlightOperation, SessionState};

/// Why a page could not be turned into a usable cache.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PageLoadError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Page(#[from] quiz_core::Error),
    #[error("attempt reports no pages")]
    NoPages,
    #[error("page {page} is past the attempt's last page ({total} pages)")]
    PastLastPage { page: usize, total: usize },
}

/// Fatal errors from `SessionController::initialize`. No session exists after
/// one of these.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InitializationError {
    #[error("initialize was already called on this controller")]
    AlreadyStarted,
    #[error("could not start an attempt on quiz {quiz_id}")]
    Start {
        quiz_id: QuizId,
        #[source]
        source: ServiceError,
    },
    #[error("could not load attempt {attempt_id}")]
    Load {
        attempt_id: AttemptId,
        #[source]
        source: PageLoadError,
    },
    #[error("session task stopped during startup")]
    Interrupted,
}

/// Errors returned by session operations once a controller exists.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session has not been initialized")]
    NotInitialized,
    #[error("another operation is in flight ({0:?})")]
    Busy(InFlightOperation),
    #[error("page {index} is out of range (attempt has {total} pages)")]
    PageOutOfRange { index: usize, total: usize },
    #[error("session is already {0:?}")]
    Finalized(SessionState),
    #[error("action was not confirmed")]
    NotConfirmed,
    #[error(transparent)]
    Field(#[from] CacheError),
    #[error("could not load page {page}")]
    NavigationFailed {
        page: usize,
        #[source]
        source: PageLoadError,
    },
    #[error("submission failed")]
    SubmitFailed {
        #[source]
        source: ServiceError,
    },
    #[error("session task has stopped")]
    Closed,
}
