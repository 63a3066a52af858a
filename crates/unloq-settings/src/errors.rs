//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or resolving events settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file {}: {source}", .path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The settings file is not valid JSON or does not fit the schema.
    #[error("malformed settings file {}: {source}", .path.display())]
    Malformed {
        /// File that failed.
        path: PathBuf,
        /// Parse or schema error.
        source: serde_json::Error,
    },
    /// Compiled defaults failed to round-trip through JSON.
    #[error("settings encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
    /// The gateway URL cannot be turned into a socket endpoint.
    #[error("invalid gateway '{gateway}': {reason}")]
    InvalidGateway {
        /// Gateway as configured.
        gateway: String,
        /// Why it was rejected.
        reason: String,
    },
    /// No API key in the settings or the environment.
    #[error("an API key is required (set `key` or {0})")]
    MissingKey(&'static str),
}

impl SettingsError {
    pub(crate) fn invalid_gateway(gateway: &str, reason: impl ToString) -> Self {
        Self::InvalidGateway {
            gateway: gateway.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
