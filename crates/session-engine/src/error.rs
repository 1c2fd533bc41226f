//! Authentication error types.

use crate::error_classifier::ClassifiedError;
use credential_store::StorageError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Raw error shape reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorDetails {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            message: message.into(),
            code: None,
            status: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, self.status) {
            (Some(name), Some(status)) => write!(f, "{} (HTTP {}): {}", name, status, self.message),
            (Some(name), None) => write!(f, "{}: {}", name, self.message),
            (None, Some(status)) => write!(f, "HTTP {}: {}", status, self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

/// Uniform view over errors for retry and classification decisions.
pub trait ErrorShape {
    fn name(&self) -> Option<&str>;
    fn message(&self) -> Cow<'_, str>;
    fn code(&self) -> Option<&str>;
    fn status(&self) -> Option<u16>;

    /// Owned copy of the shape.
    fn details(&self) -> ErrorDetails {
        ErrorDetails {
            name: self.name().map(str::to_string),
            message: self.message().into_owned(),
            code: self.code().map(str::to_string),
            status: self.status(),
        }
    }
}

impl ErrorShape for ErrorDetails {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn message(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.message)
    }

    fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    fn status(&self) -> Option<u16> {
        self.status
    }
}

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Error response from the identity provider
    #[error("Identity provider error: {0}")]
    Provider(ErrorDetails),

    /// Provider failure mapped onto the user-facing taxonomy
    #[error("{0}")]
    Classified(ClassifiedError),

    /// Refresh requested but the session holds no refresh token
    #[error("No refresh token available")]
    MissingRefreshToken,

    /// Operation requires an authenticated session
    #[error("Not logged in")]
    NotLoggedIn,

    /// Session was logged out or replaced while the operation was in flight
    #[error("Session was invalidated while the operation was in flight")]
    SessionInvalidated,

    /// Invalid state transition in the session FSM
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// Identity-provider environment could not be switched
    #[error("Environment switch failed: {0}")]
    EnvironmentSwitch(String),

    /// Credential storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Classified error, if this error went through the classifier.
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            AuthError::Classified(classified) => Some(classified),
            _ => None,
        }
    }
}

impl ErrorShape for AuthError {
    fn name(&self) -> Option<&str> {
        match self {
            AuthError::Provider(details) => details.name(),
            AuthError::Classified(classified) => classified.original.name(),
            AuthError::Http(e) if e.is_timeout() => Some("TimeoutError"),
            AuthError::Http(e) if e.is_connect() || e.is_request() => Some("NetworkError"),
            AuthError::Http(_) => Some("HttpError"),
            AuthError::MissingRefreshToken => Some("MissingRefreshToken"),
            AuthError::NotLoggedIn => Some("NotLoggedIn"),
            AuthError::SessionInvalidated => Some("SessionInvalidated"),
            AuthError::InvalidStateTransition(_) => Some("InvalidStateTransition"),
            AuthError::EnvironmentSwitch(_) => Some("EnvironmentSwitchError"),
            AuthError::Storage(_) => Some("StorageError"),
            AuthError::Json(_) => Some("JsonError"),
            AuthError::InvalidUrl(_) => Some("InvalidUrl"),
            AuthError::Config(_) => Some("ConfigError"),
        }
    }

    fn message(&self) -> Cow<'_, str> {
        match self {
            AuthError::Provider(details) => Cow::Borrowed(&details.message),
            AuthError::Classified(classified) => Cow::Borrowed(&classified.original.message),
            other => Cow::Owned(other.to_string()),
        }
    }

    fn code(&self) -> Option<&str> {
        match self {
            AuthError::Provider(details) => details.code(),
            AuthError::Classified(classified) => classified.original.code(),
            _ => None,
        }
    }

    fn status(&self) -> Option<u16> {
        match self {
            AuthError::Provider(details) => details.status,
            AuthError::Classified(classified) => classified.original.status,
            AuthError::Http(e) => e.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
