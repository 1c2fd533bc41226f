//! Login, logout, and code request behavior.

use super::harness::{
    provider_error, raw_tokens, transient_error, MockCredentialStore, TestSession, USER_EMAIL,
};
use crate::auth_fsm::{SessionSnapshot, SessionStatus};
use crate::error::AuthError;
use crate::error_classifier::ErrorKind;
use crate::telemetry::TelemetryEvent;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn login_authenticates_and_persists() {
    let session = TestSession::new();
    assert_eq!(session.manager.restore().await, SessionStatus::Unauthenticated);

    let snapshot = session.manager.login(USER_EMAIL, " 123456 ").await.unwrap();

    assert_eq!(snapshot.status, SessionStatus::Authenticated);
    assert_eq!(session.manager.status(), SessionStatus::Authenticated);

    let user = session.manager.user().unwrap();
    assert_eq!(user.subject(), Some("user-1"));
    assert_eq!(user.email(), Some(USER_EMAIL));

    let tokens = session.manager.tokens().unwrap();
    assert_eq!(tokens.access_token, "access-0");
    assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-0"));

    let stored = session.store.stored();
    assert_eq!(stored.tokens, Some(tokens));
    assert_eq!(stored.user, Some(user));

    assert!(session.manager.is_refresh_scheduled());
    assert_eq!(session.identity.calls("verify_code"), 1);
    assert_eq!(session.identity.calls("fetch_profile"), 1);
}

#[tokio::test]
async fn login_without_restore_is_allowed() {
    let session = TestSession::new();
    assert_eq!(session.manager.status(), SessionStatus::Loading);

    session.manager.login(USER_EMAIL, "123456").await.unwrap();
    assert_eq!(session.manager.status(), SessionStatus::Authenticated);
}

#[tokio::test]
async fn login_keeps_profile_email_when_present() {
    let session = TestSession::new();
    session.identity.queue_profile(Ok(serde_json::json!({
        "sub": "auth0|42",
        "email": "canonical@example.com"
    })
    .as_object()
    .cloned()
    .unwrap()));

    session.manager.login(USER_EMAIL, "123456").await.unwrap();

    let user = session.manager.user().unwrap();
    assert_eq!(user.subject(), Some("auth0|42"));
    assert_eq!(user.email(), Some("canonical@example.com"));
}

#[tokio::test]
async fn wrong_code_is_classified_and_state_unchanged() {
    let session = TestSession::new();
    session.manager.restore().await;
    session.identity.queue_verify(Err(provider_error(
        "invalid_grant",
        "Wrong email or verification code.",
        Some(403),
    )));

    let err = session.manager.login(USER_EMAIL, "000000").await.unwrap_err();

    let classified = err.classified().unwrap();
    assert_eq!(classified.kind, ErrorKind::InvalidCode);
    assert_eq!(classified.translation_key, "auth.errors.otpVerificationFailed");
    assert_eq!(session.identity.calls("verify_code"), 1);

    assert_eq!(session.manager.status(), SessionStatus::Unauthenticated);
    assert!(session.manager.user().is_none());
    assert!(session.manager.tokens().is_none());
    assert!(session.store.stored().is_empty());

    let classified_events: Vec<_> = session
        .telemetry
        .events()
        .into_iter()
        .filter(|event| matches!(event, TelemetryEvent::ErrorClassified { .. }))
        .collect();
    assert_eq!(
        classified_events,
        vec![TelemetryEvent::ErrorClassified {
            operation: "verify_code".to_string(),
            kind: ErrorKind::InvalidCode,
            translation_key: "auth.errors.otpVerificationFailed",
        }]
    );
}

#[tokio::test]
async fn expired_code_is_classified() {
    let session = TestSession::new();
    session.identity.queue_verify(Err(provider_error(
        "invalid_grant",
        "The verification code has expired",
        Some(403),
    )));

    let err = session.manager.login(USER_EMAIL, "123456").await.unwrap_err();
    assert_eq!(err.classified().unwrap().kind, ErrorKind::CodeExpired);
}

#[tokio::test]
async fn login_retries_transient_failures() {
    let session = TestSession::new();
    session.identity.queue_verify(Err(transient_error()));
    session.identity.queue_verify(Err(transient_error()));

    session.manager.login(USER_EMAIL, "123456").await.unwrap();

    assert_eq!(session.identity.calls("verify_code"), 3);
    assert_eq!(session.telemetry.count("retry_succeeded"), 1);
    assert_eq!(session.manager.status(), SessionStatus::Authenticated);
}

#[tokio::test]
async fn exhausted_retries_surface_as_classified_error() {
    let session = TestSession::new();
    for _ in 0..3 {
        session.identity.queue_verify(Err(transient_error()));
    }

    let err = session.manager.login(USER_EMAIL, "123456").await.unwrap_err();

    assert_eq!(session.identity.calls("verify_code"), 3);
    assert_eq!(err.classified().unwrap().kind, ErrorKind::UnknownError);
    assert_eq!(session.telemetry.count("retry_exhausted"), 1);
}

#[tokio::test]
async fn profile_failure_fails_login() {
    let session = TestSession::new();
    session.manager.restore().await;
    session
        .identity
        .queue_profile(Err(provider_error("access_denied", "denied", Some(403))));

    let err = session.manager.login(USER_EMAIL, "123456").await.unwrap_err();

    assert_eq!(err.classified().unwrap().kind, ErrorKind::EmailNotAuthorized);
    assert_eq!(session.manager.status(), SessionStatus::Unauthenticated);
}

#[tokio::test]
async fn login_survives_persistence_failure() {
    let store = MockCredentialStore::default();
    store.fail_save();
    let session = TestSession::with_store(store);

    session.manager.login(USER_EMAIL, "123456").await.unwrap();

    assert_eq!(session.manager.status(), SessionStatus::Authenticated);
    assert!(session.manager.user().is_some());
    assert!(session.store.stored().is_empty());
}

#[tokio::test]
async fn logout_clears_everything() {
    let session = TestSession::logged_in(USER_EMAIL).await;

    session.manager.logout().await;

    assert_eq!(session.manager.status(), SessionStatus::Unauthenticated);
    assert!(session.manager.user().is_none());
    assert!(session.manager.tokens().is_none());
    assert!(session.store.stored().is_empty());
    assert!(!session.manager.is_refresh_scheduled());
    assert_eq!(session.identity.call_log().last().map(String::as_str), Some("revoke:refresh-0"));
}

#[tokio::test]
async fn logout_completes_when_revoke_fails() {
    let session = TestSession::logged_in(USER_EMAIL).await;
    for _ in 0..3 {
        session.identity.queue_revoke(Err(provider_error(
            "NetworkError",
            "connection refused",
            None,
        )));
    }

    session.manager.logout().await;

    assert_eq!(session.identity.calls("revoke"), 3);
    assert_eq!(session.manager.status(), SessionStatus::Unauthenticated);
    assert!(session.manager.user().is_none());
    assert!(session.manager.tokens().is_none());
    assert!(session.store.stored().is_empty());
}

#[tokio::test]
async fn logout_completes_when_storage_clear_fails() {
    let store = MockCredentialStore::default();
    store.fail_clear();
    let session = TestSession::with_store(store);
    session.manager.login(USER_EMAIL, "123456").await.unwrap();

    session.manager.logout().await;

    assert_eq!(session.manager.status(), SessionStatus::Unauthenticated);
    assert!(session.manager.tokens().is_none());
}

#[tokio::test]
async fn logout_without_refresh_token_skips_revoke() {
    let session = TestSession::new();
    session
        .identity
        .queue_verify(Ok(raw_tokens("access-0", None, Some(3600))));
    session.manager.login(USER_EMAIL, "123456").await.unwrap();

    session.manager.logout().await;

    assert_eq!(session.identity.calls("revoke"), 0);
    assert_eq!(session.manager.status(), SessionStatus::Unauthenticated);
}

#[tokio::test]
async fn send_code_failure_is_classified() {
    let session = TestSession::new();
    session.identity.queue_send_code(Err(provider_error(
        "too_many_attempts",
        "Too many attempts",
        Some(429),
    )));

    let err = session.manager.send_code(USER_EMAIL).await.unwrap_err();

    assert_eq!(err.classified().unwrap().kind, ErrorKind::TooManyAttempts);
    assert_eq!(session.identity.calls("send_code"), 1);
    assert_eq!(session.manager.status(), SessionStatus::Loading);
}

#[tokio::test]
async fn resend_code_reports_its_own_operation() {
    let session = TestSession::new();
    session
        .identity
        .queue_send_code(Err(provider_error("blocked_user", "blocked", Some(401))));

    let err = session.manager.resend_code(USER_EMAIL).await.unwrap_err();

    assert!(matches!(err, AuthError::Classified(_)));
    assert!(session.telemetry.events().contains(&TelemetryEvent::ErrorClassified {
        operation: "resend_code".to_string(),
        kind: ErrorKind::UserBlocked,
        translation_key: "auth.errors.userBlocked",
    }));
}

#[tokio::test]
async fn send_code_trims_email() {
    let session = TestSession::new();
    session.manager.send_code("  user@example.com ").await.unwrap();
    assert_eq!(session.identity.call_log(), vec!["send_code:user@example.com"]);
}

#[tokio::test]
async fn state_callback_sees_each_status_change() {
    let session = TestSession::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let count = Arc::new(AtomicUsize::new(0));

    let seen_clone = seen.clone();
    let count_clone = count.clone();
    session.manager.set_state_callback(Box::new(move |snapshot: SessionSnapshot| {
        count_clone.fetch_add(1, Ordering::SeqCst);
        seen_clone
            .lock()
            .unwrap()
            .push((snapshot.status, snapshot.user.is_some()));
    }));

    session.manager.restore().await;
    session.manager.login(USER_EMAIL, "123456").await.unwrap();
    // Re-login does not change status.
    session.manager.login(USER_EMAIL, "123456").await.unwrap();
    session.manager.logout().await;

    assert_eq!(count.load(Ordering::SeqCst), 3);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (SessionStatus::Unauthenticated, false),
            (SessionStatus::Authenticated, true),
            (SessionStatus::Unauthenticated, false),
        ]
    );
}

#[tokio::test]
async fn state_callback_may_replace_itself() {
    let session = TestSession::new();
    let replaced = Arc::new(AtomicUsize::new(0));

    let manager = session.manager.clone();
    let replaced_clone = replaced.clone();
    session.manager.set_state_callback(Box::new(move |_snapshot: SessionSnapshot| {
        let replaced = replaced_clone.clone();
        manager.set_state_callback(Box::new(move |_snapshot: SessionSnapshot| {
            replaced.fetch_add(1, Ordering::SeqCst);
        }));
    }));

    session.manager.restore().await;
    session.manager.login(USER_EMAIL, "123456").await.unwrap();

    assert_eq!(replaced.load(Ordering::SeqCst), 1);
}
