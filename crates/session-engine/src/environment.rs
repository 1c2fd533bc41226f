//! Runtime switching between the default and review identity tenants.

use crate::error::{AuthError, AuthResult};
use crate::telemetry::{Telemetry, TelemetryEvent};
use otp_session_config::{Config, EnvironmentConfig, EnvironmentKind};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// A client whose endpoints follow the active environment.
pub trait EnvironmentAware: Send + Sync {
    /// Short name used in logs.
    fn target_name(&self) -> &'static str;

    /// Point the client at `config`.
    fn apply_environment(&self, config: &EnvironmentConfig) -> AuthResult<()>;
}

struct SwitchState {
    current: EnvironmentKind,
    active: EnvironmentConfig,
    /// Default-tenant config captured on the first switch to review.
    original: Option<EnvironmentConfig>,
}

/// Routes reviewer accounts to the review tenant and everyone else to the default one.
///
/// Concurrent `switch_for` calls are serialized by the state lock, but callers
/// should still drive switching from a single login flow.
pub struct EnvironmentSwitcher {
    reviewer_emails: HashSet<String>,
    review_config: EnvironmentConfig,
    targets: RwLock<Vec<Arc<dyn EnvironmentAware>>>,
    telemetry: Arc<dyn Telemetry>,
    state: Mutex<SwitchState>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl EnvironmentSwitcher {
    pub fn new<I, S>(
        initial: EnvironmentConfig,
        review_config: EnvironmentConfig,
        reviewer_emails: I,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let reviewer_emails = reviewer_emails
            .into_iter()
            .map(|email| normalize_email(email.as_ref()))
            .filter(|email| !email.is_empty())
            .collect();

        Self {
            reviewer_emails,
            review_config,
            targets: RwLock::new(Vec::new()),
            telemetry,
            state: Mutex::new(SwitchState {
                current: EnvironmentKind::Default,
                active: initial,
                original: None,
            }),
        }
    }

    pub fn from_config(config: &Config, telemetry: Arc<dyn Telemetry>) -> Self {
        Self::new(
            config.default_environment.clone(),
            config.review_environment.clone(),
            &config.reviewer_emails,
            telemetry,
        )
    }

    /// Add a client to reinitialize on every switch. The client is pointed at
    /// the active environment right away.
    pub fn register_target(&self, target: Arc<dyn EnvironmentAware>) -> AuthResult<()> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        target.apply_environment(&state.active)?;
        self.targets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(target);
        Ok(())
    }

    /// Environment an email belongs to.
    pub fn environment_for_email(&self, email: &str) -> EnvironmentKind {
        if self.reviewer_emails.contains(&normalize_email(email)) {
            EnvironmentKind::Review
        } else {
            EnvironmentKind::Default
        }
    }

    pub fn current(&self) -> EnvironmentKind {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
    }

    pub fn active_config(&self) -> EnvironmentConfig {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .clone()
    }

    /// Whether default-tenant values have been captured.
    pub fn has_snapshot(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .original
            .is_some()
    }

    /// Switch to the environment `email` belongs to. Returns the environment in effect.
    pub fn switch_for(&self, email: &str) -> AuthResult<EnvironmentKind> {
        self.switch_to(self.environment_for_email(email))
    }

    /// Return to the default environment and forget the captured defaults.
    pub fn reset(&self) -> AuthResult<()> {
        let result = if self.current() == EnvironmentKind::Review {
            self.switch_to(EnvironmentKind::Default).map(|_| ())
        } else {
            Ok(())
        };

        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .original = None;
        result
    }

    fn switch_to(&self, target: EnvironmentKind) -> AuthResult<EnvironmentKind> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.current == target {
            debug!(environment = %target, "Already in target environment");
            return Ok(target);
        }

        let next = match target {
            EnvironmentKind::Review => self.review_config.clone(),
            EnvironmentKind::Default => match &state.original {
                Some(original) => original.clone(),
                None => {
                    warn!("No captured default environment to restore; staying put");
                    return Ok(state.current);
                }
            },
        };

        self.reinitialize(&next, &state.active)?;

        if target == EnvironmentKind::Review && state.original.is_none() {
            state.original = Some(state.active.clone());
        }
        let from = state.current;
        state.active = next;
        state.current = target;
        drop(state);

        info!(%from, to = %target, "Identity environment switched");
        self.telemetry
            .track(TelemetryEvent::EnvironmentSwitched { from, to: target });
        Ok(target)
    }

    /// Apply `next` to every target; on failure put already-updated targets back on `previous`.
    fn reinitialize(&self, next: &EnvironmentConfig, previous: &EnvironmentConfig) -> AuthResult<()> {
        let targets = self.targets.read().unwrap_or_else(PoisonError::into_inner);

        for (index, target) in targets.iter().enumerate() {
            if let Err(e) = target.apply_environment(next) {
                warn!(target = target.target_name(), error = %e, "Failed to reinitialize client");
                for updated in &targets[..index] {
                    if let Err(rollback) = updated.apply_environment(previous) {
                        warn!(target = updated.target_name(), error = %rollback, "Rollback failed");
                    }
                }
                return Err(AuthError::EnvironmentSwitch(format!(
                    "{}: {}",
                    target.target_name(),
                    e
                )));
            }
        }
        Ok(())
    }
}
