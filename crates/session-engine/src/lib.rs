//! Authentication session engine.
//!
//! This crate provides:
//! - Passwordless (email one-time code) login against an identity provider
//! - Session management with proactive, single-flight token refresh
//! - Retry with exponential backoff for identity-provider calls
//! - Classification of provider failures into user-facing error kinds
//! - Runtime switching between the default and review identity tenants
//! - An API client that attaches the session's bearer token

mod api_client;
mod auth_fsm;
mod environment;
mod error;
mod error_classifier;
mod identity_client;
mod refresh_scheduler;
mod retry;
mod session;
mod telemetry;
mod tokens;

#[cfg(test)]
mod tests;

pub use api_client::{ApiClient, AuthMode, TokenSource};
pub use auth_fsm::session_machine;
pub use auth_fsm::{
    SessionMachine, SessionMachineInput, SessionMachineState, SessionSnapshot, SessionStatus,
};
pub use environment::{EnvironmentAware, EnvironmentSwitcher};
pub use error::{AuthError, AuthResult, ErrorDetails, ErrorShape};
pub use error_classifier::{classify_error, ClassifiedError, ErrorKind, UNKNOWN_ERROR_NAME};
pub use identity_client::{HttpIdentityClient, IdentityClient, PASSWORDLESS_OTP_GRANT};
pub use refresh_scheduler::{RefreshPlan, RefreshScheduler};
pub use retry::{is_retryable, RetryExecutor};
pub use session::{SessionManager, SessionOptions, SessionStateCallback};
pub use telemetry::{NoopTelemetry, Telemetry, TelemetryEvent, TracingTelemetry};
pub use tokens::{decode_jwt_claims, tokens_from_raw, RawTokens, RawUser};

pub use credential_store::{Tokens, User};
pub use otp_session_config::{EnvironmentConfig, EnvironmentKind, RetryConfig};
