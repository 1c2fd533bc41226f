//! Identity-provider client.
//!
//! [`IdentityClient`] is the seam the session manager talks to.
//! [`HttpIdentityClient`] implements it against Auth0-style endpoints:
//! - `POST /passwordless/start` to email a one-time code
//! - `POST /oauth/token` to exchange a code or refresh token for tokens
//! - `POST /oauth/revoke` to revoke a refresh token
//! - `GET /userinfo` to fetch the profile claims

use crate::environment::EnvironmentAware;
use crate::error::{AuthError, AuthResult, ErrorDetails};
use crate::tokens::{RawTokens, RawUser};
use async_trait::async_trait;
use otp_session_config::EnvironmentConfig;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{PoisonError, RwLock};
use url::Url;

/// Grant type for exchanging an emailed one-time code.
pub const PASSWORDLESS_OTP_GRANT: &str = "http://auth0.com/oauth/grant-type/passwordless/otp";

/// Passwordless connection used for email codes.
const EMAIL_CONNECTION: &str = "email";

#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Email a one-time code to `email`.
    async fn send_code(&self, email: &str) -> AuthResult<()>;

    /// Exchange an emailed code for tokens.
    async fn verify_code(&self, email: &str, code: &str) -> AuthResult<RawTokens>;

    /// Exchange a refresh token for a new token set.
    async fn refresh(&self, refresh_token: &str) -> AuthResult<RawTokens>;

    async fn revoke(&self, refresh_token: &str) -> AuthResult<()>;

    /// Fetch the profile claims for an access token.
    async fn fetch_profile(&self, access_token: &str) -> AuthResult<RawUser>;
}

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Error body returned by the identity provider.
#[derive(Debug, Default, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct PasswordlessStartRequest<'a> {
    client_id: &'a str,
    connection: &'a str,
    email: &'a str,
    send: &'a str,
}

#[derive(Debug, Serialize)]
struct OtpTokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    username: &'a str,
    otp: &'a str,
    realm: &'a str,
    audience: &'a str,
    scope: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshTokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
struct RevokeRequest<'a> {
    client_id: &'a str,
    token: &'a str,
}

/// HTTP identity client whose tenant can be swapped at runtime.
pub struct HttpIdentityClient {
    http_client: reqwest::Client,
    config: RwLock<EnvironmentConfig>,
}

impl HttpIdentityClient {
    pub fn new(config: EnvironmentConfig) -> Self {
        Self::with_http_client(reqwest::Client::new(), config)
    }

    pub fn with_http_client(http_client: reqwest::Client, config: EnvironmentConfig) -> Self {
        Self {
            http_client,
            config: RwLock::new(config),
        }
    }

    /// Snapshot of the environment requests currently go to.
    pub fn config(&self) -> EnvironmentConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn endpoint(config: &EnvironmentConfig, path: &str) -> String {
        format!("{}{}", config.issuer_url(), path)
    }

    /// Map a non-2xx response onto [`AuthError::Provider`].
    async fn provider_error(operation: &str, response: reqwest::Response) -> AuthError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(
            operation,
            status = %status,
            body_summary = %summarize_response_body(&body),
            "Identity provider rejected request"
        );

        let details = match serde_json::from_str::<ProviderErrorBody>(&body) {
            Ok(parsed) => {
                let code = parsed.error.or(parsed.code);
                ErrorDetails {
                    name: code.clone().or(parsed.name).or_else(|| Some("Error".to_string())),
                    message: parsed
                        .error_description
                        .or(parsed.message)
                        .unwrap_or_else(|| status.to_string()),
                    code,
                    status: Some(status.as_u16()),
                }
            }
            Err(_) => ErrorDetails {
                name: None,
                message: status.to_string(),
                code: None,
                status: Some(status.as_u16()),
            },
        };
        AuthError::Provider(details)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        operation: &str,
        path: &str,
        body: &B,
    ) -> AuthResult<reqwest::Response> {
        let url = Self::endpoint(&self.config(), path);
        tracing::debug!(operation, %url, "Calling identity provider");

        let response = self.http_client.post(&url).json(body).send().await?;
        if !response.status().is_success() {
            return Err(Self::provider_error(operation, response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl IdentityClient for HttpIdentityClient {
    async fn send_code(&self, email: &str) -> AuthResult<()> {
        let config = self.config();
        let request = PasswordlessStartRequest {
            client_id: &config.client_id,
            connection: EMAIL_CONNECTION,
            email,
            send: "code",
        };
        self.post_json("send_code", "/passwordless/start", &request)
            .await?;
        Ok(())
    }

    async fn verify_code(&self, email: &str, code: &str) -> AuthResult<RawTokens> {
        let config = self.config();
        let request = OtpTokenRequest {
            grant_type: PASSWORDLESS_OTP_GRANT,
            client_id: &config.client_id,
            username: email,
            otp: code,
            realm: EMAIL_CONNECTION,
            audience: &config.audience,
            scope: &config.scope,
        };
        let response = self
            .post_json("verify_code", "/oauth/token", &request)
            .await?;
        Ok(response.json().await?)
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<RawTokens> {
        let config = self.config();
        let request = RefreshTokenRequest {
            grant_type: "refresh_token",
            client_id: &config.client_id,
            refresh_token,
        };
        let response = self.post_json("refresh", "/oauth/token", &request).await?;
        Ok(response.json().await?)
    }

    async fn revoke(&self, refresh_token: &str) -> AuthResult<()> {
        let config = self.config();
        let request = RevokeRequest {
            client_id: &config.client_id,
            token: refresh_token,
        };
        self.post_json("revoke", "/oauth/revoke", &request).await?;
        Ok(())
    }

    async fn fetch_profile(&self, access_token: &str) -> AuthResult<RawUser> {
        let url = Self::endpoint(&self.config(), "/userinfo");
        tracing::debug!(%url, "Fetching user profile");

        let response = self
            .http_client
            .get(&url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::provider_error("fetch_profile", response).await);
        }
        Ok(response.json().await?)
    }
}

impl EnvironmentAware for HttpIdentityClient {
    fn target_name(&self) -> &'static str {
        "identity_client"
    }

    fn apply_environment(&self, config: &EnvironmentConfig) -> AuthResult<()> {
        Url::parse(&config.issuer_url())?;
        if config.client_id.trim().is_empty() {
            return Err(AuthError::Config(format!(
                "{} environment has no client id",
                config.kind
            )));
        }

        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config.clone();
        tracing::debug!(environment = %config.kind, "Identity client reinitialized");
        Ok(())
    }
}
