//! Durable credential storage for the OTP session subsystem.
//!
//! This crate provides:
//! - The [`CredentialStore`] seam consumed by the session manager
//! - A key/value [`SecureStorage`] abstraction with in-memory and file backends
//! - [`SecureCredentialStore`], which maps tokens and user profile onto storage keys
//!
//! Encryption at rest is the backend's concern; values are stored as JSON strings.

mod file;
mod keys;
mod memory;
mod session_data;
mod store;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use session_data::{StoredSession, Tokens, User};
pub use store::SecureCredentialStore;
pub use traits::{CredentialStore, SecureStorage};

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
