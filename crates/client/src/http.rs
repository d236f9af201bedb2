use std::env;
use std::time::Duration;

use async_trait::async_trait;
use quiz_core::model::{
    AccessInfo, AnswerMap, Attempt, AttemptData, AttemptId, QuizId, SubmissionResult,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ServiceError;
use crate::retry::{RetryConfig, retry_async_with_config};
use crate::service::AssessmentService;

#[derive(Clone, Debug)]
pub struct HttpServiceConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl HttpServiceConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            request_timeout: Duration::from_secs(15),
            retry: RetryConfig::default(),
        }
    }

    /// Read `QUIZ_SERVICE_URL`, `QUIZ_SERVICE_TOKEN` and `QUIZ_TIMEOUT_SECS`.
    ///
    /// Returns `None` when no service URL is configured.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("QUIZ_SERVICE_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        let mut config = Self::new(base_url);
        config.token = env::var("QUIZ_SERVICE_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        if let Some(secs) = env::var("QUIZ_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
        {
            config.request_timeout = Duration::from_secs(secs);
        }
        Some(config)
    }
}

/// JSON-over-HTTP adapter for the assessment service.
///
/// Reads and `save_attempt` are retried while the failure is transient;
/// `start_attempt` and `submit_attempt` are sent exactly once.
#[derive(Clone)]
pub struct HttpAssessmentService {
    client: Client,
    config: HttpServiceConfig,
}

#[derive(Debug, Serialize)]
struct AnswersBody<'a> {
    answers: &'a AnswerMap,
    finish: bool,
}

impl HttpAssessmentService {
    /// Build the adapter.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Http` if the HTTP client cannot be constructed.
    pub fn new(config: HttpServiceConfig) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ServiceError> {
        let response = self.authorized(request).send().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::Timeout
            } else {
                ServiceError::Http(e)
            }
        })?;
        check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        let url = self.url(path);
        retry_async_with_config(&self.config.retry, ServiceError::is_transient, || {
            let request = self.client.get(&url);
            async move {
                let response = self.send(request).await?;
                decode(response).await
            }
        })
        .await
    }
}

async fn check_status(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ServiceError::NotFound);
    }
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(ServiceError::Rejected {
            code: status.as_u16().to_string(),
            message,
        });
    }
    Err(ServiceError::HttpStatus(status))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ServiceError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl AssessmentService for HttpAssessmentService {
    async fn get_in_progress_attempt(&self, quiz_id: QuizId) -> Result<Option<Attempt>, ServiceError> {
        match self
            .get_json::<Option<Attempt>>(&format!("quizzes/{quiz_id}/attempts/in-progress"))
            .await
        {
            Ok(attempt) => Ok(attempt),
            Err(ServiceError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn start_attempt(&self, quiz_id: QuizId) -> Result<Attempt, ServiceError> {
        let url = self.url(&format!("quizzes/{quiz_id}/attempts"));
        let response = self
            .send(self.client.post(url))
            .await
            .map_err(|err| match err {
                ServiceError::Rejected { message, .. } => ServiceError::AttemptStart(message),
                other => other,
            })?;
        decode(response).await
    }

    async fn get_attempt_data(
        &self,
        attempt_id: AttemptId,
        page: usize,
    ) -> Result<AttemptData, ServiceError> {
        self.get_json(&format!("attempts/{attempt_id}/pages/{page}"))
            .await
    }

    async fn save_attempt(
        &self,
        attempt_id: AttemptId,
        answers: &AnswerMap,
    ) -> Result<(), ServiceError> {
        let url = self.url(&format!("attempts/{attempt_id}/answers"));
        let body = AnswersBody {
            answers,
            finish: false,
        };
        retry_async_with_config(&self.config.retry, ServiceError::is_transient, || {
            let request = self.client.put(&url).json(&body);
            async move { self.send(request).await.map(|_| ()) }
        })
        .await
    }

    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        answers: &AnswerMap,
    ) -> Result<SubmissionResult, ServiceError> {
        let url = self.url(&format!("attempts/{attempt_id}/submit"));
        let body = AnswersBody {
            answers,
            finish: true,
        };
        let response = self.send(self.client.post(url).json(&body)).await?;
        decode(response).await
    }

    async fn get_access_info(&self, quiz_id: QuizId) -> Result<AccessInfo, ServiceError> {
        self.get_json(&format!("quizzes/{quiz_id}/access")).await
    }
}
