use std::future::Future;
use std::time::Duration;

/// Exponential backoff with optional jitter for idempotent service calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            jitter_max: Some(Duration::from_millis(100)),
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Run `f` until it succeeds, `should_retry` rejects the error, or the attempts
/// are used up. The last error is returned.
pub async fn retry_async_with_config<F, Fut, T, E, P>(
    config: &RetryConfig,
    should_retry: P,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempts_left = config.max_attempts.max(1);
    let mut backoff = config.base_backoff;

    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempts_left = attempts_left.saturating_sub(1);
                if attempts_left == 0 || !should_retry(&e) {
                    return Err(e);
                }

                let wait = match config.jitter_max {
                    Some(jitter_max) => {
                        let jitter_ms = u64::try_from(jitter_max.as_millis()).unwrap_or(u64::MAX);
                        let extra = if jitter_ms == 0 {
                            0
                        } else {
                            rand::random::<u64>() % (jitter_ms + 1)
                        };
                        backoff + Duration::from_millis(extra)
                    }
                    None => backoff,
                };
                tracing::debug!(?wait, attempts_left, "retrying service call");
                tokio::time::sleep(wait).await;

                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}
