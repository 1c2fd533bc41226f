//! Session lifecycle with FSM-based state tracking and proactive token refresh.
//!
//! [`SessionManager`] owns the in-memory session (status, user, tokens) and
//! coordinates the identity client, credential store, environment switcher,
//! and refresh timer around it.
//!
//! Refresh is single-flight: callers that arrive while a refresh is running
//! wait for it and reuse its tokens. Every login and logout bumps a session
//! generation; a refresh whose generation is stale by the time it completes
//! is discarded instead of resurrecting the old session.

use crate::api_client::TokenSource;
use crate::auth_fsm::{SessionMachine, SessionMachineInput, SessionSnapshot, SessionStatus};
use crate::environment::EnvironmentSwitcher;
use crate::error::{AuthError, AuthResult};
use crate::error_classifier::classify_error;
use crate::identity_client::IdentityClient;
use crate::refresh_scheduler::{RefreshPlan, RefreshScheduler};
use crate::retry::RetryExecutor;
use crate::telemetry::{Telemetry, TelemetryEvent};
use crate::tokens::tokens_from_raw;
use async_trait::async_trait;
use chrono::Utc;
use credential_store::{CredentialStore, Tokens, User};
use otp_session_config::{Config, EnvironmentKind, RetryConfig, DEFAULT_REFRESH_BUFFER_SECS};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Callback type for session state change notifications.
pub type SessionStateCallback = Box<dyn Fn(SessionSnapshot) + Send + Sync>;

/// Tunables for a [`SessionManager`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Retry policy for every identity-provider call.
    pub retry: RetryConfig,
    /// Lead time before expiry at which tokens are refreshed.
    pub refresh_buffer: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            refresh_buffer: Duration::from_secs(DEFAULT_REFRESH_BUFFER_SECS),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: config.retry.clone(),
            refresh_buffer: config.refresh_buffer(),
        }
    }
}

struct SessionData {
    machine: SessionMachine,
    user: Option<User>,
    tokens: Option<Tokens>,
    /// Bumped on every login and logout.
    generation: u64,
}

impl SessionData {
    fn status(&self) -> SessionStatus {
        SessionStatus::from(self.machine.state())
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status(),
            user: self.user.clone(),
            tokens: self.tokens.clone(),
        }
    }
}

struct SessionInner {
    identity: Arc<dyn IdentityClient>,
    store: Arc<dyn CredentialStore>,
    environment: Arc<EnvironmentSwitcher>,
    telemetry: Arc<dyn Telemetry>,
    retry: RetryExecutor,
    retry_config: RetryConfig,
    scheduler: RefreshScheduler,
    data: Mutex<SessionData>,
    /// Held for the duration of a refresh.
    refresh_flight: tokio::sync::Mutex<()>,
    state_callback: Mutex<Option<Arc<dyn Fn(SessionSnapshot) + Send + Sync>>>,
}

/// Authentication session manager.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    /// Create a session manager with default retry and refresh settings.
    pub fn new(
        identity: Arc<dyn IdentityClient>,
        store: Arc<dyn CredentialStore>,
        environment: Arc<EnvironmentSwitcher>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self::with_options(identity, store, environment, telemetry, SessionOptions::default())
    }

    pub fn with_options(
        identity: Arc<dyn IdentityClient>,
        store: Arc<dyn CredentialStore>,
        environment: Arc<EnvironmentSwitcher>,
        telemetry: Arc<dyn Telemetry>,
        options: SessionOptions,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                identity,
                store,
                environment,
                retry: RetryExecutor::new(telemetry.clone()),
                telemetry,
                retry_config: options.retry,
                scheduler: RefreshScheduler::new(options.refresh_buffer),
                data: Mutex::new(SessionData {
                    machine: SessionMachine::new(),
                    user: None,
                    tokens: None,
                    generation: 0,
                }),
                refresh_flight: tokio::sync::Mutex::new(()),
                state_callback: Mutex::new(None),
            }),
        }
    }

    /// Set a callback to be notified of session status changes.
    pub fn set_state_callback(&self, callback: SessionStateCallback) {
        let mut cb = self
            .inner
            .state_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cb = Some(Arc::from(callback));
    }

    fn lock_data(&self) -> MutexGuard<'_, SessionData> {
        self.inner.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> SessionStatus {
        self.lock_data().status()
    }

    pub fn user(&self) -> Option<User> {
        self.lock_data().user.clone()
    }

    pub fn tokens(&self) -> Option<Tokens> {
        self.lock_data().tokens.clone()
    }

    /// Status, user, and tokens read under one lock.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock_data().snapshot()
    }

    /// Identity environment currently in effect.
    pub fn environment(&self) -> EnvironmentKind {
        self.inner.environment.current()
    }

    pub fn is_refresh_scheduled(&self) -> bool {
        self.inner.scheduler.is_armed()
    }

    fn generation(&self) -> u64 {
        self.lock_data().generation
    }

    /// Transition the FSM, apply `update` under the same lock, and notify on status change.
    fn transition<F>(&self, input: &SessionMachineInput, update: F) -> AuthResult<SessionStatus>
    where
        F: FnOnce(&mut SessionData),
    {
        let mut data = self.lock_data();
        let old_status = data.status();

        data.machine.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                data.machine.state()
            ))
        })?;
        update(&mut data);

        let new_status = data.status();
        let snapshot = (old_status != new_status).then(|| data.snapshot());
        drop(data);

        if let Some(snapshot) = snapshot {
            debug!(
                old_state = %old_status,
                new_state = %new_status,
                "Session state transition"
            );
            self.notify_state_change(snapshot);
        }

        Ok(new_status)
    }

    fn notify_state_change(&self, snapshot: SessionSnapshot) {
        // Called outside the lock so the callback may replace itself.
        let callback = self
            .inner
            .state_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(snapshot);
        }
    }

    /// Map an identity failure onto the user-facing taxonomy.
    fn classify(&self, operation: &str, err: AuthError) -> AuthError {
        let classified = classify_error(&err);
        warn!(
            operation,
            kind = %classified.kind,
            error = %err,
            "Authentication request failed"
        );
        self.inner.telemetry.track(TelemetryEvent::ErrorClassified {
            operation: operation.to_string(),
            kind: classified.kind,
            translation_key: classified.translation_key,
        });
        AuthError::Classified(classified)
    }

    /// Restore the session persisted by a previous run.
    ///
    /// Storage problems never fail restore; they leave the session unauthenticated.
    pub async fn restore(&self) -> SessionStatus {
        let status = self.status();
        if status != SessionStatus::Loading {
            debug!(state = %status, "Session already restored");
            return status;
        }

        let stored = match self.inner.store.load().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to load stored credentials");
                return self.finish_restore_empty();
            }
        };

        let (tokens, user) = match (stored.tokens, stored.user) {
            (Some(tokens), Some(user)) => (tokens, user),
            (None, None) => {
                info!("No stored session found");
                return self.finish_restore_empty();
            }
            _ => {
                info!("Stored session is incomplete, clearing it");
                if let Err(e) = self.inner.store.clear().await {
                    warn!(error = %e, "Failed to clear incomplete session");
                }
                return self.finish_restore_empty();
            }
        };

        if let Some(email) = user.email() {
            if let Err(e) = self.inner.environment.switch_for(email) {
                warn!(error = %e, "Could not select environment for stored session");
                return self.finish_restore_empty();
            }
        }

        let restored = self.transition(&SessionMachineInput::Restored, |data| {
            data.generation += 1;
            data.tokens = Some(tokens.clone());
            data.user = Some(user.clone());
        });
        if let Err(e) = restored {
            warn!(error = %e, "Could not restore session");
            return self.status();
        }

        info!(
            user_id = user.subject().unwrap_or("unknown"),
            environment = %self.inner.environment.current(),
            "Session restored"
        );

        if self.schedule_refresh(&tokens) {
            self.refresh_inline("restore").await;
        }
        self.status()
    }

    fn finish_restore_empty(&self) -> SessionStatus {
        self.transition(&SessionMachineInput::NothingStored, |_| {})
            .unwrap_or_else(|e| {
                warn!(error = %e, "Unexpected state while restoring");
                self.status()
            })
    }

    /// Email a one-time code to `email`.
    pub async fn send_code(&self, email: &str) -> AuthResult<()> {
        self.request_code("send_code", email).await
    }

    /// Email a fresh code to `email`.
    pub async fn resend_code(&self, email: &str) -> AuthResult<()> {
        self.request_code("resend_code", email).await
    }

    async fn request_code(&self, operation: &str, email: &str) -> AuthResult<()> {
        let email = email.trim();
        self.inner.environment.switch_for(email)?;

        self.inner
            .retry
            .retry(operation, &self.inner.retry_config, || {
                self.inner.identity.send_code(email)
            })
            .await
            .map_err(|e| self.classify(operation, e))?;

        info!(
            operation,
            environment = %self.inner.environment.current(),
            "Verification code sent"
        );
        Ok(())
    }

    /// Exchange an emailed code for a session.
    ///
    /// Persistence failures are logged and do not fail the login; the session
    /// then lives in memory only.
    pub async fn login(&self, email: &str, code: &str) -> AuthResult<SessionSnapshot> {
        let email = email.trim();
        let code = code.trim();
        self.inner.environment.switch_for(email)?;

        let retry_config = &self.inner.retry_config;
        let raw = self
            .inner
            .retry
            .retry("verify_code", retry_config, || {
                self.inner.identity.verify_code(email, code)
            })
            .await
            .map_err(|e| self.classify("verify_code", e))?;
        let tokens = tokens_from_raw(raw, Utc::now().timestamp(), None);

        let claims = self
            .inner
            .retry
            .retry("fetch_profile", retry_config, || {
                self.inner.identity.fetch_profile(&tokens.access_token)
            })
            .await
            .map_err(|e| self.classify("fetch_profile", e))?;
        let mut user = User::from_claims(claims);
        user.insert_missing("email", Value::String(email.to_string()));

        if let Err(e) = self.inner.store.save_tokens(&tokens).await {
            warn!(error = %e, "Failed to persist tokens; session will not survive restart");
        }
        if let Err(e) = self.inner.store.save_user(&user).await {
            warn!(error = %e, "Failed to persist user; session will not survive restart");
        }

        self.transition(&SessionMachineInput::LoginSucceeded, |data| {
            data.generation += 1;
            data.tokens = Some(tokens.clone());
            data.user = Some(user.clone());
        })?;

        info!(
            user_id = user.subject().unwrap_or("unknown"),
            environment = %self.inner.environment.current(),
            "Login successful"
        );

        if self.schedule_refresh(&tokens) {
            self.refresh_inline("login").await;
        }
        Ok(self.snapshot())
    }

    /// End the session. Local teardown always completes.
    pub async fn logout(&self) {
        self.inner.scheduler.cancel();

        let refresh_token = {
            let mut data = self.lock_data();
            data.generation += 1;
            data.tokens
                .as_ref()
                .and_then(|tokens| tokens.refresh_token.clone())
        };

        if let Some(refresh_token) = refresh_token {
            let revoked = self
                .inner
                .retry
                .retry("revoke", &self.inner.retry_config, || {
                    self.inner.identity.revoke(&refresh_token)
                })
                .await;
            if let Err(e) = revoked {
                warn!(error = %e, "Failed to revoke refresh token, continuing logout");
            }
        }

        if let Err(e) = self.inner.store.clear().await {
            warn!(error = %e, "Failed to clear stored credentials");
        }

        if let Err(e) = self.inner.environment.reset() {
            warn!(error = %e, "Failed to reset identity environment");
        }

        if let Err(e) = self.transition(&SessionMachineInput::LoggedOut, |data| {
            data.tokens = None;
            data.user = None;
        }) {
            warn!(error = %e, "Unexpected state during logout");
        }

        // A refresh that slipped in during revoke may have re-armed the timer.
        self.inner.scheduler.cancel();
        info!("Logged out");
    }

    /// Exchange the refresh token for new tokens.
    ///
    /// Any failure ends the session.
    pub async fn refresh(&self) -> AuthResult<Tokens> {
        let observed = {
            let data = self.lock_data();
            data.tokens
                .clone()
                .map(|tokens| (data.generation, tokens))
        };
        let _flight = self.inner.refresh_flight.lock().await;

        let (generation, tokens) = {
            let data = self.lock_data();
            match (&data.tokens, data.status()) {
                (Some(tokens), SessionStatus::Authenticated) => (data.generation, tokens.clone()),
                _ => return Err(AuthError::NotLoggedIn),
            }
        };

        if let Some((observed_generation, observed_tokens)) = observed {
            if observed_generation == generation && observed_tokens != tokens {
                debug!("Reusing tokens from a refresh that finished while waiting");
                return Ok(tokens);
            }
        }

        let Some(refresh_token) = tokens.refresh_token.clone() else {
            warn!("No refresh token available, logging out");
            self.logout().await;
            return Err(AuthError::MissingRefreshToken);
        };

        debug!("Refreshing access token");
        let result = self
            .inner
            .retry
            .retry("refresh", &self.inner.retry_config, || {
                self.inner.identity.refresh(&refresh_token)
            })
            .await;

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                if self.generation() == generation {
                    warn!(error = %e, "Token refresh failed, logging out");
                    self.logout().await;
                } else {
                    debug!(error = %e, "Refresh failed for a session that already ended");
                }
                return Err(e);
            }
        };

        let refreshed = tokens_from_raw(raw, Utc::now().timestamp(), Some(&refresh_token));
        if self.generation() != generation {
            info!("Session changed during refresh, discarding refreshed tokens");
            return Err(AuthError::SessionInvalidated);
        }

        if let Err(e) = self.inner.store.save_tokens(&refreshed).await {
            warn!(error = %e, "Failed to persist refreshed tokens");
        }

        // The session may have ended while the tokens were being written.
        let superseded = {
            let mut data = self.lock_data();
            if data.generation == generation {
                data.machine
                    .consume(&SessionMachineInput::TokensRefreshed)
                    .map_err(|_| {
                        AuthError::InvalidStateTransition(format!(
                            "Cannot apply TokensRefreshed in state {:?}",
                            data.machine.state()
                        ))
                    })?;
                data.tokens = Some(refreshed.clone());
                None
            } else {
                Some(data.tokens.clone())
            }
        };
        if let Some(current) = superseded {
            info!("Session changed while persisting refresh, discarding refreshed tokens");
            self.resync_stored_tokens(current).await;
            return Err(AuthError::SessionInvalidated);
        }

        if self.schedule_refresh(&refreshed) {
            warn!(
                expires_at = ?refreshed.expires_at,
                "Refreshed token is already inside the refresh window"
            );
        }
        info!("Access token refreshed");
        Ok(refreshed)
    }

    /// Put storage back in line with the live session after a stale write.
    async fn resync_stored_tokens(&self, current: Option<Tokens>) {
        let result = match current {
            Some(tokens) => self.inner.store.save_tokens(&tokens).await,
            None => self.inner.store.clear().await,
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to roll back stale refreshed tokens");
        }
    }

    async fn refresh_inline(&self, reason: &str) {
        info!(reason, "Access token inside refresh window, refreshing now");
        if let Err(e) = self.refresh().await {
            warn!(reason, error = %e, "Immediate token refresh failed");
        }
    }

    /// Arm the refresh timer for `tokens`. Returns true when a refresh is due now.
    fn schedule_refresh(&self, tokens: &Tokens) -> bool {
        let scheduler = &self.inner.scheduler;
        match scheduler.plan(tokens.expires_at, Utc::now().timestamp_millis()) {
            RefreshPlan::Unscheduled => {
                scheduler.cancel();
                debug!("Token has no expiry, refresh not scheduled");
                false
            }
            RefreshPlan::Immediate => {
                scheduler.cancel();
                true
            }
            RefreshPlan::After(delay) => {
                scheduler.arm(delay, scheduled_refresh(Arc::downgrade(&self.inner)));
                info!(refresh_in_secs = delay.as_secs(), "Token refresh scheduled");
                false
            }
        }
    }

    /// A valid access token, refreshing first when the current one has expired.
    pub async fn get_valid_access_token(&self) -> Option<String> {
        let tokens = {
            let data = self.lock_data();
            if !data.status().is_authenticated() {
                return None;
            }
            data.tokens.clone()?
        };

        if !tokens.is_expired(Utc::now().timestamp()) {
            return Some(tokens.access_token);
        }

        info!("Access token expired, refreshing");
        match self.refresh().await {
            Ok(refreshed) => Some(refreshed.access_token),
            Err(e) => {
                debug!(error = %e, "No valid access token after refresh");
                None
            }
        }
    }

    /// Stop background work.
    pub fn shutdown(&self) {
        if self.inner.scheduler.cancel() {
            debug!("Session shut down with a pending refresh");
        }
    }
}

/// Body of the refresh timer. Holds only a weak handle so the timer never
/// keeps a dropped session alive.
fn scheduled_refresh(inner: Weak<SessionInner>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let manager = SessionManager { inner };
        debug!("Refresh timer fired");
        if let Err(e) = manager.refresh().await {
            warn!(error = %e, "Scheduled token refresh failed");
        }
    })
}

#[async_trait]
impl TokenSource for SessionManager {
    async fn access_token(&self) -> Option<String> {
        self.get_valid_access_token().await
    }
}
