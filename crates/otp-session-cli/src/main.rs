//! OTP session CLI - passwordless login and session management.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use commands::Context;
use otp_session_config::{init_logging, Config, Paths};
use output::OutputFormat;
use session_engine::AuthError;
use tracing::debug;

/// Log in with a one-time email code and manage the persisted session.
#[derive(Parser)]
#[command(name = "otp-session")]
#[command(about = "Passwordless OTP login and session management")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true, env = "OTP_SESSION_LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Email a one-time verification code
    SendCode {
        /// Account email
        #[arg(short, long)]
        email: String,
    },

    /// Request another verification code
    ResendCode {
        /// Account email
        #[arg(short, long)]
        email: String,
    },

    /// Verify a code and log in
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,
        /// Verification code; prompted for when omitted
        #[arg(short, long)]
        code: Option<String>,
    },

    /// Logout and clear session
    Logout,

    /// Check authentication status
    Status,

    /// Print a valid access token
    Token,

    /// Refresh tokens now
    Refresh,

    /// GET a path on the active environment's API
    Api {
        /// Request path, e.g. /v1/me
        path: String,
        /// Send the request without a bearer token
        #[arg(long)]
        anonymous: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Write the effective configuration to the config file
    Init,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.format;

    if let Err(err) = run(cli).await {
        match err.downcast_ref::<AuthError>() {
            Some(auth_err) => output::print_auth_error(auth_err, format),
            None => output::print_error(&format!("{:#}", err), format),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = Paths::new()?;
    let mut config = Config::load(&paths)?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    init_logging(&config.log_level, Some(&paths))?;
    debug!(base_dir = %paths.base_dir().display(), "Configuration loaded");

    let format = cli.format;
    let command = match cli.command {
        Commands::Config { command } => {
            return match command {
                ConfigCommands::Show => commands::config::show(&config, format),
                ConfigCommands::Init => commands::config::init(&paths, &config, format),
            };
        }
        command => command,
    };

    let ctx = Context::bootstrap(&paths, &config).await?;
    let result = match command {
        Commands::SendCode { email } => commands::auth::send_code(&ctx, &email, false, format).await,
        Commands::ResendCode { email } => commands::auth::send_code(&ctx, &email, true, format).await,
        Commands::Login { email, code } => commands::auth::login(&ctx, &email, code, format).await,
        Commands::Logout => commands::auth::logout(&ctx, format).await,
        Commands::Status => commands::auth::status(&ctx, format),
        Commands::Token => commands::auth::token(&ctx, format).await,
        Commands::Refresh => commands::auth::refresh(&ctx, format).await,
        Commands::Api { path, anonymous } => commands::api::get(&ctx, &path, anonymous, format).await,
        Commands::Config { .. } => Ok(()),
    };

    ctx.session.shutdown();
    result
}
