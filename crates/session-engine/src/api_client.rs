//! Application API client with bearer-token injection.

use crate::environment::EnvironmentAware;
use crate::error::{AuthError, AuthResult, ErrorDetails};
use async_trait::async_trait;
use otp_session_config::EnvironmentConfig;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::{Arc, PoisonError, RwLock};
use url::Url;

/// Supplies access tokens to outgoing API requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// A currently valid access token, or `None` when signed out.
    async fn access_token(&self) -> Option<String>;
}

/// Whether a request carries the session's bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    Bearer,
    /// Never attach a token.
    Anonymous,
}

pub struct ApiClient {
    http_client: reqwest::Client,
    base_url: RwLock<String>,
    tokens: Arc<dyn TokenSource>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: RwLock::new(base_url.into().trim_end_matches('/').to_string()),
            tokens,
        }
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path.trim_start_matches('/'))
    }

    /// Build a request to `path`, attaching `Authorization: Bearer` unless anonymous.
    pub async fn request(&self, method: Method, path: &str, auth: AuthMode) -> reqwest::RequestBuilder {
        let builder = self.http_client.request(method, self.url(path));
        if auth == AuthMode::Anonymous {
            return builder;
        }

        match self.tokens.access_token().await {
            Some(token) => builder.bearer_auth(token),
            None => {
                tracing::debug!(path, "No access token available; sending request unauthenticated");
                builder
            }
        }
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, auth: AuthMode) -> AuthResult<T> {
        let response = self.request(Method::GET, path, auth).await.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Provider(ErrorDetails {
                name: Some("ApiError".to_string()),
                message: if body.is_empty() { status.to_string() } else { body },
                code: None,
                status: Some(status.as_u16()),
            }));
        }
        Ok(response.json().await?)
    }
}

impl EnvironmentAware for ApiClient {
    fn target_name(&self) -> &'static str {
        "api_client"
    }

    fn apply_environment(&self, config: &EnvironmentConfig) -> AuthResult<()> {
        let base_url = config.api_base_url();
        Url::parse(&base_url)?;
        *self.base_url.write().unwrap_or_else(PoisonError::into_inner) = base_url;
        tracing::debug!(environment = %config.kind, "API client reinitialized");
        Ok(())
    }
}
