use thiserror::Error;

/// Errors surfaced by assessment service adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("not found")]
    NotFound,

    #[error("rejected by service ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("attempt could not be started: {0}")]
    AttemptStart(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("request timed out")]
    Timeout,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("service returned status {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ServiceError {
    /// Whether repeating the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Unavailable(_) | ServiceError::Timeout => true,
            ServiceError::HttpStatus(status) => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            ServiceError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            ServiceError::NotFound
            | ServiceError::Rejected { .. }
            | ServiceError::AttemptStart(_)
            | ServiceError::InvalidResponse(_) => false,
        }
    }
}
