//! Configuration, paths, and logging for the OTP session subsystem.

mod config;
mod environment;
mod error;
mod logging;
mod paths;

pub use config::{Config, RetryConfig, DEFAULT_LOG_LEVEL, DEFAULT_REFRESH_BUFFER_SECS};
pub use environment::{EnvironmentConfig, EnvironmentKind};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
