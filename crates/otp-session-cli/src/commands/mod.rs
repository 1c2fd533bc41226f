//! Command implementations.

pub mod api;
pub mod auth;
pub mod config;

use anyhow::Result;
use credential_store::{FileStorage, SecureCredentialStore};
use otp_session_config::{Config, Paths};
use session_engine::{
    ApiClient, EnvironmentSwitcher, HttpIdentityClient, SessionManager, SessionOptions,
    SessionSnapshot, SessionStatus, Telemetry, TracingTelemetry,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Wired-up session subsystem for one CLI invocation.
pub struct Context {
    pub session: SessionManager,
    pub api: Arc<ApiClient>,
}

impl Context {
    /// Build the session subsystem from configuration and restore any
    /// persisted session.
    pub async fn bootstrap(paths: &Paths, config: &Config) -> Result<Self> {
        let telemetry: Arc<dyn Telemetry> = Arc::new(TracingTelemetry);

        let identity = Arc::new(HttpIdentityClient::new(config.default_environment.clone()));
        let switcher = Arc::new(EnvironmentSwitcher::from_config(config, telemetry.clone()));
        switcher.register_target(identity.clone())?;

        let store = Arc::new(SecureCredentialStore::new(Box::new(FileStorage::new(
            paths.credentials_file(),
        ))));

        let session = SessionManager::with_options(
            identity,
            store,
            switcher.clone(),
            telemetry,
            SessionOptions::from_config(config),
        );

        let api = Arc::new(ApiClient::new(
            config.default_environment.api_base_url(),
            Arc::new(session.clone()),
        ));
        switcher.register_target(api.clone())?;

        session.set_state_callback(Box::new(|snapshot: SessionSnapshot| {
            debug!(status = %snapshot.status, user_id = ?snapshot.user_id(), "Session state changed");
        }));

        let status = session.restore().await;
        info!(%status, environment = %session.environment(), "Session restored");

        Ok(Self { session, api })
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.status() == SessionStatus::Authenticated
    }
}
