//! Authenticated API requests.

use super::Context;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use serde_json::Value;
use session_engine::AuthMode;

/// GET `path` on the active environment's API and print the JSON body.
pub async fn get(ctx: &Context, path: &str, anonymous: bool, format: OutputFormat) -> Result<()> {
    let auth = if anonymous {
        AuthMode::Anonymous
    } else {
        AuthMode::Bearer
    };

    tracing::debug!(url = %ctx.api.url(path), ?auth, "API request");
    let body: Value = ctx.api.get_json(path, auth).await?;

    let text = serde_json::to_string_pretty(&body)?;
    output::print(&body, &text, format);
    Ok(())
}
