//! Authentication commands.

use super::Context;
use crate::output::{self, OutputFormat};
use anyhow::{bail, Result};
use serde_json::json;
use std::io::{self, IsTerminal};

/// Request a one-time code for `email`.
pub async fn send_code(ctx: &Context, email: &str, resend: bool, format: OutputFormat) -> Result<()> {
    if resend {
        ctx.session.resend_code(email).await?;
    } else {
        ctx.session.send_code(email).await?;
    }

    output::print_success(&format!("Verification code sent to {}", email.trim()), format);
    Ok(())
}

/// Verify a one-time code and establish a session.
pub async fn login(
    ctx: &Context,
    email: &str,
    code: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let code = match code {
        Some(code) => code,
        None => prompt_code()?,
    };

    let snapshot = ctx.session.login(email, &code).await?;
    let who = snapshot
        .email()
        .or_else(|| snapshot.user_id())
        .unwrap_or("user")
        .to_string();

    output::print(
        &json!({
            "status": "success",
            "session": snapshot,
            "environment": ctx.session.environment(),
        }),
        &format!("Logged in as {}", who),
        format,
    );
    Ok(())
}

/// End the session. Stored credentials are cleared even when the session
/// could not be restored.
pub async fn logout(ctx: &Context, format: OutputFormat) -> Result<()> {
    let was_authenticated = ctx.is_authenticated();
    ctx.session.logout().await;

    let message = if was_authenticated {
        "Logged out"
    } else {
        "Not logged in; cleared stored credentials"
    };
    output::print_success(message, format);
    Ok(())
}

/// Show the restored session.
pub fn status(ctx: &Context, format: OutputFormat) -> Result<()> {
    let snapshot = ctx.session.snapshot();

    match format {
        OutputFormat::Json => output::print(
            &json!({
                "session": snapshot,
                "environment": ctx.session.environment(),
                "expires_at": snapshot.expires_at(),
                "refresh_scheduled": ctx.session.is_refresh_scheduled(),
            }),
            "",
            format,
        ),
        OutputFormat::Text => {
            output::print_row("Status", snapshot.status.as_str());
            output::print_row("Environment", ctx.session.environment().as_str());
            if let Some(email) = snapshot.email() {
                output::print_row("Email", email);
            }
            if let Some(user_id) = snapshot.user_id() {
                output::print_row("User ID", user_id);
            }
            if let Some(expires_at) = snapshot.expires_at() {
                output::print_row("Expires at", &format_expiry(expires_at));
            }
        }
    }
    Ok(())
}

/// Print a valid access token, refreshing first when it has expired.
pub async fn token(ctx: &Context, format: OutputFormat) -> Result<()> {
    let Some(token) = ctx.session.get_valid_access_token().await else {
        bail!("Not logged in");
    };

    output::print(&json!({ "access_token": token }), &token, format);
    Ok(())
}

/// Force a token refresh.
pub async fn refresh(ctx: &Context, format: OutputFormat) -> Result<()> {
    let tokens = ctx.session.refresh().await?;

    let expiry = tokens
        .expires_at
        .map(format_expiry)
        .unwrap_or_else(|| "unknown".to_string());
    output::print(
        &json!({ "status": "success", "expires_at": tokens.expires_at }),
        &format!("Tokens refreshed, new expiry {}", expiry),
        format,
    );
    Ok(())
}

fn prompt_code() -> Result<String> {
    let code = if io::stdin().is_terminal() {
        rpassword::prompt_password("Verification code: ")?
    } else {
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        line
    };

    let code = code.trim().to_string();
    if code.is_empty() {
        bail!("Verification code is required");
    }
    Ok(code)
}

fn format_expiry(expires_at: i64) -> String {
    chrono::DateTime::from_timestamp(expires_at, 0)
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| expires_at.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use credential_store::{CredentialStore, FileStorage, SecureCredentialStore, Tokens, User};
    use otp_session_config::{Config, Paths};
    use session_engine::SessionStatus;

    fn file_store(paths: &Paths) -> SecureCredentialStore {
        SecureCredentialStore::new(Box::new(FileStorage::new(paths.credentials_file())))
    }

    #[tokio::test]
    async fn logout_clears_credentials_left_by_failed_restore() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.default_environment.client_id = "cli-client".to_string();
        // The review tenant cannot be applied, so the reviewer session fails to restore.
        config.review_environment.client_id = String::new();
        config.reviewer_emails = vec!["reviewer@example.com".to_string()];

        let store = file_store(&paths);
        store
            .save_tokens(&Tokens {
                access_token: "access".to_string(),
                refresh_token: None,
                token_type: "Bearer".to_string(),
                expires_at: Some(chrono::Utc::now().timestamp() + 3600),
            })
            .await
            .unwrap();
        let claims = serde_json::json!({ "sub": "user-1", "email": "reviewer@example.com" });
        store
            .save_user(&User::from_claims(claims.as_object().cloned().unwrap()))
            .await
            .unwrap();

        let ctx = Context::bootstrap(&paths, &config).await.unwrap();
        assert_eq!(ctx.session.status(), SessionStatus::Unauthenticated);
        assert!(store.load().await.unwrap().is_complete());

        logout(&ctx, OutputFormat::Json).await.unwrap();

        assert!(store.load().await.unwrap().is_empty());
    }

    #[test]
    fn format_expiry_renders_rfc3339() {
        assert_eq!(format_expiry(0), "1970-01-01T00:00:00+00:00");
    }
}
