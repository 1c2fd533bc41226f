//! Identity-provider environment definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Which identity-provider tenant a configuration targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentKind {
    /// Production tenant used by regular accounts.
    #[default]
    Default,
    /// Alternate tenant reserved for app-store reviewer accounts.
    Review,
}

impl EnvironmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Review => "review",
        }
    }
}

impl fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity-provider and API settings for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub kind: EnvironmentKind,
    /// Identity-provider domain, either a bare host (`tenant.auth0.com`) or a full URL.
    pub domain: String,
    pub client_id: String,
    pub audience: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Base URL of the application API that receives bearer tokens.
    pub api_url: String,
}

pub(crate) fn default_scope() -> String {
    "openid profile email offline_access".to_string()
}

impl EnvironmentConfig {
    /// Base URL of the identity provider, with an `https://` scheme added
    /// when `domain` is a bare host. Never ends with a slash.
    pub fn issuer_url(&self) -> String {
        let domain = self.domain.trim().trim_end_matches('/');
        if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{}", domain)
        }
    }

    /// API base URL without a trailing slash.
    pub fn api_base_url(&self) -> String {
        self.api_url.trim().trim_end_matches('/').to_string()
    }

    /// Check that both URLs parse.
    pub fn validate(&self) -> Result<(), url::ParseError> {
        Url::parse(&self.issuer_url())?;
        Url::parse(&self.api_base_url())?;
        Ok(())
    }
}
