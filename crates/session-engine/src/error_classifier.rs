//! Maps identity-provider failures onto the user-facing error taxonomy.
//!
//! Classification is a pure total function: every error shape resolves to
//! exactly one [`ErrorKind`] and one translation key.

use crate::error::{ErrorDetails, ErrorShape};
use serde::Serialize;
use std::fmt;

/// Name used when the error carries no name of its own.
pub const UNKNOWN_ERROR_NAME: &str = "unknown_error";

/// User-facing authentication error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidCode,
    CodeExpired,
    EmailNotAuthorized,
    TooManyAttempts,
    UserBlocked,
    UnknownError,
}

impl ErrorKind {
    /// Fixed translation key for this kind.
    pub fn translation_key(&self) -> &'static str {
        match self {
            ErrorKind::InvalidCode => "auth.errors.otpVerificationFailed",
            ErrorKind::CodeExpired => "auth.errors.otpExpired",
            ErrorKind::EmailNotAuthorized => "auth.errors.emailNotAuthorized",
            ErrorKind::TooManyAttempts => "auth.errors.tooManyAttempts",
            ErrorKind::UserBlocked => "auth.errors.userBlocked",
            ErrorKind::UnknownError => "auth.errors.unknown",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidCode => "INVALID_CODE",
            ErrorKind::CodeExpired => "CODE_EXPIRED",
            ErrorKind::EmailNotAuthorized => "EMAIL_NOT_AUTHORIZED",
            ErrorKind::TooManyAttempts => "TOO_MANY_ATTEMPTS",
            ErrorKind::UserBlocked => "USER_BLOCKED",
            ErrorKind::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider failure after classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub translation_key: &'static str,
    pub original: ErrorDetails,
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.kind, self.translation_key, self.original)
    }
}

impl std::error::Error for ClassifiedError {}

/// Classify an error shape. First matching rule wins.
pub fn classify_error<E: ErrorShape + ?Sized>(err: &E) -> ClassifiedError {
    let mut original = err.details();
    if original.name.is_none() {
        original.name = Some(UNKNOWN_ERROR_NAME.to_string());
    }

    let kind = kind_for(&original);
    ClassifiedError {
        kind,
        translation_key: kind.translation_key(),
        original,
    }
}

fn kind_for(details: &ErrorDetails) -> ErrorKind {
    let name = details.name.as_deref().unwrap_or(UNKNOWN_ERROR_NAME);
    let is = |code: &str| name == code || details.code.as_deref() == Some(code);

    if is("invalid_grant") {
        if details.message.to_lowercase().contains("expired") {
            return ErrorKind::CodeExpired;
        }
        return ErrorKind::InvalidCode;
    }
    if is("access_denied") {
        return ErrorKind::EmailNotAuthorized;
    }
    // Account-linking failures surface as a bare 500 with a generic name.
    if name == "Error" && details.status == Some(500) {
        return ErrorKind::EmailNotAuthorized;
    }
    if is("too_many_attempts") || details.status == Some(429) {
        return ErrorKind::TooManyAttempts;
    }
    if is("blocked_user") {
        return ErrorKind::UserBlocked;
    }
    ErrorKind::UnknownError
}
