//! Storage trait definitions.

use crate::{StorageResult, StoredSession, Tokens, User};
use async_trait::async_trait;

/// Trait for key/value storage backends
pub trait SecureStorage: Send + Sync {
    /// Store a value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Durable storage for the session's tokens and user profile.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load whatever was persisted. Missing entries come back as `None`.
    async fn load(&self) -> StorageResult<StoredSession>;

    /// Replace the persisted token set.
    async fn save_tokens(&self, tokens: &Tokens) -> StorageResult<()>;

    /// Replace the persisted user profile.
    async fn save_user(&self, user: &User) -> StorageResult<()>;

    /// Remove all persisted session data.
    async fn clear(&self) -> StorageResult<()>;
}
