//! Retry with exponential backoff for identity-provider calls.

use crate::error::ErrorShape;
use crate::telemetry::{Telemetry, TelemetryEvent};
use otp_session_config::RetryConfig;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Substrings that mark a transport-level failure.
const TRANSIENT_PATTERNS: &[&str] = &["network", "timeout", "connection", "service", "not found"];

/// Identity-provider codes whose outcome a retry cannot change.
const SEMANTIC_CODES: &[&str] = &[
    "invalid_grant",
    "access_denied",
    "too_many_attempts",
    "blocked_user",
    "unauthorized",
];

/// True when `err` is worth another attempt under `config`.
pub fn is_retryable<E: ErrorShape + ?Sized>(err: &E, config: &RetryConfig) -> bool {
    let carries_semantic_code = [err.name(), err.code()]
        .into_iter()
        .flatten()
        .any(|value| SEMANTIC_CODES.contains(&value));
    if carries_semantic_code {
        return false;
    }

    if let Some(status) = err.status() {
        if config.is_retryable_status(status) {
            return true;
        }
    }

    let haystack = format!(
        "{}{}{}",
        err.name().unwrap_or_default(),
        err.message(),
        err.code().unwrap_or_default()
    )
    .to_lowercase();
    TRANSIENT_PATTERNS
        .iter()
        .any(|pattern| haystack.contains(pattern))
}

/// Runs fallible async operations with capped exponential backoff.
#[derive(Clone)]
pub struct RetryExecutor {
    telemetry: Arc<dyn Telemetry>,
}

impl RetryExecutor {
    pub fn new(telemetry: Arc<dyn Telemetry>) -> Self {
        Self { telemetry }
    }

    /// Call `op` until it succeeds, fails with a non-retryable error, or runs
    /// out of attempts. The last error is returned unchanged.
    pub async fn retry<T, E, F, Fut>(
        &self,
        operation: &str,
        config: &RetryConfig,
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ErrorShape + Display,
    {
        let max_attempts = config.max_attempts();
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        self.telemetry.track(TelemetryEvent::RetrySucceeded {
                            operation: operation.to_string(),
                            attempts: attempt,
                        });
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !is_retryable(&err, config) {
                        debug!(operation, attempt, error = %err, "Not retrying");
                        self.telemetry.track(TelemetryEvent::RetryNonRetryable {
                            operation: operation.to_string(),
                            attempt,
                            error: err.to_string(),
                        });
                        return Err(err);
                    }

                    if attempt >= max_attempts {
                        warn!(operation, attempts = attempt, error = %err, "Giving up after retries");
                        self.telemetry.track(TelemetryEvent::RetryExhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                            error: err.to_string(),
                        });
                        return Err(err);
                    }

                    let delay = config.delay_for_attempt(attempt);
                    self.telemetry.track(TelemetryEvent::RetryAttempt {
                        operation: operation.to_string(),
                        attempt,
                        delay,
                        error: err.to_string(),
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
