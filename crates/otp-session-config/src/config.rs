//! Configuration management for the session subsystem.

use crate::environment::default_scope;
use crate::{CoreError, CoreResult, EnvironmentConfig, EnvironmentKind, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default identity-provider domain (can be overridden at compile time via AUTH0_DOMAIN env var).
pub const DEFAULT_AUTH0_DOMAIN: &str = match option_env!("AUTH0_DOMAIN") {
    Some(domain) => domain,
    None => "login.example.com",
};

/// Default client id (can be overridden at compile time via AUTH0_CLIENT_ID env var).
pub const DEFAULT_AUTH0_CLIENT_ID: &str = match option_env!("AUTH0_CLIENT_ID") {
    Some(id) => id,
    None => "default-client-id",
};

/// Default audience (can be overridden at compile time via AUTH0_AUDIENCE env var).
pub const DEFAULT_AUTH0_AUDIENCE: &str = match option_env!("AUTH0_AUDIENCE") {
    Some(audience) => audience,
    None => "https://api.example.com",
};

/// Default API base URL (can be overridden at compile time via API_URL env var).
pub const DEFAULT_API_URL: &str = match option_env!("API_URL") {
    Some(url) => url,
    None => "https://api.example.com",
};

/// Review tenant domain (compile-time REVIEW_AUTH0_DOMAIN).
pub const REVIEW_AUTH0_DOMAIN: &str = match option_env!("REVIEW_AUTH0_DOMAIN") {
    Some(domain) => domain,
    None => "review-login.example.com",
};

/// Review tenant client id (compile-time REVIEW_AUTH0_CLIENT_ID).
pub const REVIEW_AUTH0_CLIENT_ID: &str = match option_env!("REVIEW_AUTH0_CLIENT_ID") {
    Some(id) => id,
    None => "review-client-id",
};

/// Review tenant audience (compile-time REVIEW_AUTH0_AUDIENCE).
pub const REVIEW_AUTH0_AUDIENCE: &str = match option_env!("REVIEW_AUTH0_AUDIENCE") {
    Some(audience) => audience,
    None => "https://review-api.example.com",
};

/// Review tenant API base URL (compile-time REVIEW_API_URL).
pub const REVIEW_API_URL: &str = match option_env!("REVIEW_API_URL") {
    Some(url) => url,
    None => "https://review-api.example.com",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Lead time before token expiry at which a proactive refresh fires.
pub const DEFAULT_REFRESH_BUFFER_SECS: u64 = 5 * 60;

/// Retry behavior for identity-provider calls.
///
/// Delays grow as `initial_delay_ms * backoff_multiplier^(attempt - 1)` and
/// are capped at `max_delay_ms`. No jitter is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// HTTP statuses that are always retried.
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            retryable_status_codes: vec![408, 429, 500, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given failed attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Total number of attempts allowed.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Tenant used by regular accounts.
    #[serde(default = "default_environment")]
    pub default_environment: EnvironmentConfig,
    /// Tenant used by reviewer accounts.
    #[serde(default = "review_environment")]
    pub review_environment: EnvironmentConfig,
    /// Emails routed to the review tenant.
    #[serde(default)]
    pub reviewer_emails: Vec<String>,
    /// Seconds before expiry at which tokens are refreshed.
    #[serde(default = "default_refresh_buffer_secs")]
    pub refresh_buffer_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_refresh_buffer_secs() -> u64 {
    DEFAULT_REFRESH_BUFFER_SECS
}

fn default_environment() -> EnvironmentConfig {
    EnvironmentConfig {
        kind: EnvironmentKind::Default,
        domain: DEFAULT_AUTH0_DOMAIN.to_string(),
        client_id: DEFAULT_AUTH0_CLIENT_ID.to_string(),
        audience: DEFAULT_AUTH0_AUDIENCE.to_string(),
        scope: default_scope(),
        api_url: DEFAULT_API_URL.to_string(),
    }
}

fn review_environment() -> EnvironmentConfig {
    EnvironmentConfig {
        kind: EnvironmentKind::Review,
        domain: REVIEW_AUTH0_DOMAIN.to_string(),
        client_id: REVIEW_AUTH0_CLIENT_ID.to_string(),
        audience: REVIEW_AUTH0_AUDIENCE.to_string(),
        scope: default_scope(),
        api_url: REVIEW_API_URL.to_string(),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            default_environment: default_environment(),
            review_environment: review_environment(),
            reviewer_emails: Vec::new(),
            refresh_buffer_secs: DEFAULT_REFRESH_BUFFER_SECS,
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.normalize();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override configuration from process environment variables.
    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).and_then(non_empty);

        if let Some(level) = get("OTP_SESSION_LOG_LEVEL") {
            self.log_level = level;
        }

        override_environment(&mut self.default_environment, "", &get);
        override_environment(&mut self.review_environment, "REVIEW_", &get);

        if let Some(emails) = get("REVIEWER_EMAILS") {
            self.reviewer_emails = emails
                .split(',')
                .map(str::trim)
                .filter(|email| !email.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(buffer) = get("OTP_SESSION_REFRESH_BUFFER_SECS") {
            match buffer.parse::<u64>() {
                Ok(secs) => self.refresh_buffer_secs = secs,
                Err(_) => tracing::warn!(
                    value = %buffer,
                    "Ignoring invalid OTP_SESSION_REFRESH_BUFFER_SECS"
                ),
            }
        }
    }

    /// Pin environment kinds to their slot regardless of file contents.
    fn normalize(&mut self) {
        self.default_environment.kind = EnvironmentKind::Default;
        self.review_environment.kind = EnvironmentKind::Review;
    }

    /// Validate URLs of both environments.
    pub fn validate(&self) -> CoreResult<()> {
        for environment in [&self.default_environment, &self.review_environment] {
            environment
                .validate()
                .map_err(|source| CoreError::InvalidUrl {
                    environment: environment.kind,
                    source,
                })?;
        }
        Ok(())
    }

    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_secs)
    }
}

fn override_environment(
    environment: &mut EnvironmentConfig,
    prefix: &str,
    get: &impl Fn(&str) -> Option<String>,
) {
    if let Some(domain) = get(&format!("{prefix}AUTH0_DOMAIN")) {
        environment.domain = domain;
    }
    if let Some(client_id) = get(&format!("{prefix}AUTH0_CLIENT_ID")) {
        environment.client_id = client_id;
    }
    if let Some(audience) = get(&format!("{prefix}AUTH0_AUDIENCE")) {
        environment.audience = audience;
    }
    if let Some(scope) = get(&format!("{prefix}AUTH0_SCOPE")) {
        environment.scope = scope;
    }
    if let Some(api_url) = get(&format!("{prefix}API_URL")) {
        environment.api_url = api_url;
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.default_environment.domain, DEFAULT_AUTH0_DOMAIN);
        assert_eq!(config.review_environment.kind, EnvironmentKind::Review);
        assert_eq!(config.refresh_buffer(), Duration::from_secs(300));
        assert!(config.reviewer_emails.is_empty());
    }

    #[test]
    fn test_retry_config_default() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.max_attempts(), 4);
        assert_eq!(
            retry.retryable_status_codes,
            vec![408, 429, 500, 502, 503, 504]
        );
        assert!(retry.is_retryable_status(503));
        assert!(!retry.is_retryable_status(400));
    }

    #[test]
    fn test_retry_delay_exponential_backoff_with_ceiling() {
        let retry = RetryConfig {
            initial_delay_ms: 500,
            max_delay_ms: 5_000,
            ..RetryConfig::default()
        };

        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(2000));
        assert_eq!(retry.delay_for_attempt(4), Duration::from_millis(4000));
        assert_eq!(retry.delay_for_attempt(5), Duration::from_millis(5000));
        assert_eq!(retry.delay_for_attempt(60), Duration::from_millis(5000));
    }

    #[test]
    fn test_retry_delay_custom_multiplier() {
        let retry = RetryConfig {
            initial_delay_ms: 100,
            max_delay_ms: 100_000,
            backoff_multiplier: 3.0,
            ..RetryConfig::default()
        };

        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(900));
    }

    #[test]
    fn test_overrides_apply_to_both_environments() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            ("AUTH0_DOMAIN", "prod.auth0.com"),
            ("API_URL", "https://prod.example.com"),
            ("REVIEW_AUTH0_CLIENT_ID", "review-123"),
            ("REVIEWER_EMAILS", " Reviewer@Example.com , ,other@example.com"),
            ("OTP_SESSION_LOG_LEVEL", "debug"),
        ]));

        assert_eq!(config.default_environment.domain, "prod.auth0.com");
        assert_eq!(config.default_environment.api_url, "https://prod.example.com");
        assert_eq!(config.review_environment.client_id, "review-123");
        assert_eq!(
            config.reviewer_emails,
            vec!["Reviewer@Example.com".to_string(), "other@example.com".to_string()]
        );
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[("AUTH0_DOMAIN", "   ")]));
        assert_eq!(config.default_environment.domain, DEFAULT_AUTH0_DOMAIN);
    }

    #[test]
    fn test_invalid_refresh_buffer_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[("OTP_SESSION_REFRESH_BUFFER_SECS", "soon")]));
        assert_eq!(config.refresh_buffer_secs, DEFAULT_REFRESH_BUFFER_SECS);

        config.apply_overrides(lookup(&[("OTP_SESSION_REFRESH_BUFFER_SECS", "60")]));
        assert_eq!(config.refresh_buffer_secs, 60);
    }

    #[test]
    fn test_config_load_from_file_partial() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "log_level": "debug",
            "reviewer_emails": ["review@example.com"],
            "retry": { "max_retries": 5 }
        }"#;

        std::fs::write(&config_path, config_json).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.reviewer_emails, vec!["review@example.com".to_string()]);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_ms, 1_000);
        assert_eq!(config.default_environment.domain, DEFAULT_AUTH0_DOMAIN);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.refresh_buffer_secs = 120;
        config.reviewer_emails = vec!["review@example.com".to_string()];
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.refresh_buffer_secs, 120);
        assert_eq!(loaded.reviewer_emails, config.reviewer_emails);
    }

    #[test]
    fn test_validate_rejects_invalid_url() {
        let mut config = Config::default();
        config.review_environment.api_url = "not a valid url".to_string();

        let result = config.validate();
        assert!(matches!(
            result,
            Err(CoreError::InvalidUrl {
                environment: EnvironmentKind::Review,
                ..
            })
        ));
    }

    #[test]
    fn test_normalize_pins_kinds() {
        let mut config = Config::default();
        config.review_environment.kind = EnvironmentKind::Default;
        config.normalize();
        assert_eq!(config.review_environment.kind, EnvironmentKind::Review);
    }
}
