// Log output for the command line tool
// Library code logs through the `log` facade; this installs the subscriber that prints it

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Error)]
#[error("Failed to install log subscriber: {0}")]
pub struct LoggingError(String);

/// Log to stderr, filtered by RUST_LOG (default "info")
pub fn start_logging() -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| LoggingError(e.to_string()))
}
