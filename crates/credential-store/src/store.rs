//! Credential store backed by a key/value [`SecureStorage`].
//!
//! Backends are synchronous and may touch disk or a platform keychain, so
//! every call runs on tokio's blocking pool.

use crate::{
    CredentialStore, SecureStorage, StorageError, StorageKeys, StorageResult, StoredSession,
    Tokens, User,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Persists tokens and user profile as JSON values under [`StorageKeys`].
pub struct SecureCredentialStore {
    storage: Arc<dyn SecureStorage>,
}

impl SecureCredentialStore {
    /// Create a credential store with the given storage backend
    pub fn new(storage: Box<dyn SecureStorage>) -> Self {
        Self {
            storage: Arc::from(storage),
        }
    }

    async fn blocking<T, F>(&self, op: F) -> StorageResult<T>
    where
        F: FnOnce(&dyn SecureStorage) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || op(storage.as_ref()))
            .await
            .map_err(|e| StorageError::Platform(format!("storage task failed: {}", e)))?
    }
}

fn read_json<T: DeserializeOwned>(
    storage: &dyn SecureStorage,
    key: &str,
) -> StorageResult<Option<T>> {
    match storage.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl CredentialStore for SecureCredentialStore {
    async fn load(&self) -> StorageResult<StoredSession> {
        self.blocking(|storage| {
            let tokens: Option<Tokens> = read_json(storage, StorageKeys::TOKENS)?;
            let user: Option<User> = read_json(storage, StorageKeys::USER)?;
            Ok(StoredSession { tokens, user })
        })
        .await
    }

    async fn save_tokens(&self, tokens: &Tokens) -> StorageResult<()> {
        let raw = serde_json::to_string(tokens)?;
        self.blocking(move |storage| storage.set(StorageKeys::TOKENS, &raw))
            .await
    }

    async fn save_user(&self, user: &User) -> StorageResult<()> {
        let raw = serde_json::to_string(user)?;
        self.blocking(move |storage| storage.set(StorageKeys::USER, &raw))
            .await
    }

    /// Deletes every key even if an earlier delete fails; the first error is returned.
    async fn clear(&self) -> StorageResult<()> {
        self.blocking(|storage| {
            let mut first_error = None;
            for key in StorageKeys::ALL {
                if let Err(e) = storage.delete(key) {
                    tracing::warn!(key, error = %e, "Failed to delete credential key");
                    first_error.get_or_insert(e);
                }
            }
            match first_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
        .await
    }
}
