//! Telemetry call contract.
//!
//! The engine reports retry, classification, and environment events through
//! [`Telemetry`]. The default sink turns them into `tracing` events.

use crate::error_classifier::ErrorKind;
use otp_session_config::EnvironmentKind;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    /// A retryable failure; the next attempt runs after `delay`.
    RetryAttempt {
        operation: String,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    /// Operation succeeded after at least one retry.
    RetrySucceeded { operation: String, attempts: u32 },
    RetryNonRetryable {
        operation: String,
        attempt: u32,
        error: String,
    },
    RetryExhausted {
        operation: String,
        attempts: u32,
        error: String,
    },
    ErrorClassified {
        operation: String,
        kind: ErrorKind,
        translation_key: &'static str,
    },
    EnvironmentSwitched {
        from: EnvironmentKind,
        to: EnvironmentKind,
    },
}

impl TelemetryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TelemetryEvent::RetryAttempt { .. } => "retry_attempt",
            TelemetryEvent::RetrySucceeded { .. } => "retry_succeeded",
            TelemetryEvent::RetryNonRetryable { .. } => "retry_non_retryable",
            TelemetryEvent::RetryExhausted { .. } => "retry_exhausted",
            TelemetryEvent::ErrorClassified { .. } => "error_classified",
            TelemetryEvent::EnvironmentSwitched { .. } => "environment_switched",
        }
    }
}

/// Sink for telemetry events.
pub trait Telemetry: Send + Sync {
    fn track(&self, event: TelemetryEvent);
}

/// Emits every event as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn track(&self, event: TelemetryEvent) {
        let name = event.name();
        match event {
            TelemetryEvent::RetryAttempt {
                operation,
                attempt,
                delay,
                error,
            } => debug!(
                event = name,
                %operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                %error,
                "Retrying after transient failure"
            ),
            TelemetryEvent::RetrySucceeded {
                operation,
                attempts,
            } => info!(event = name, %operation, attempts, "Succeeded after retry"),
            TelemetryEvent::RetryNonRetryable {
                operation,
                attempt,
                error,
            } => debug!(event = name, %operation, attempt, %error, "Non-retryable failure"),
            TelemetryEvent::RetryExhausted {
                operation,
                attempts,
                error,
            } => warn!(event = name, %operation, attempts, %error, "Retries exhausted"),
            TelemetryEvent::ErrorClassified {
                operation,
                kind,
                translation_key,
            } => info!(event = name, %operation, %kind, translation_key, "Classified auth error"),
            TelemetryEvent::EnvironmentSwitched { from, to } => {
                info!(event = name, %from, %to, "Switched identity environment")
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn track(&self, _event: TelemetryEvent) {}
}
