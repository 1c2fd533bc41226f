//! Configuration commands.

use crate::output::{self, OutputFormat};
use anyhow::Result;
use otp_session_config::{Config, Paths};

/// Print the effective configuration, after file and environment overrides.
pub fn show(config: &Config, format: OutputFormat) -> Result<()> {
    let text = serde_json::to_string_pretty(config)?;
    output::print(config, &text, format);
    Ok(())
}

/// Write the effective configuration to the config file.
pub fn init(paths: &Paths, config: &Config, format: OutputFormat) -> Result<()> {
    config.save(paths)?;
    output::print_success(
        &format!("Wrote {}", paths.config_file().display()),
        format,
    );
    Ok(())
}
