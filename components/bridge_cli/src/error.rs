//! Error types for the launcher

use bridge::BridgeError;
use thiserror::Error;

/// Launcher errors
#[derive(Debug, Error)]
pub enum CliError {
    /// Environment or module failure
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Unrecognized `--log-level`
    #[error("invalid log level '{0}'")]
    InvalidLogLevel(String),

    /// The exports could not be rendered
    #[error("output error: {0}")]
    Output(#[from] serde_json::Error),
}

/// Result type for launcher operations
pub type CliResult<T> = Result<T, CliError>;
