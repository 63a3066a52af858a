//! Error taxonomy for the events client.
//!
//! - [`EventsError`]: every failure a caller can observe, with a stable
//!   machine-readable [`code`](EventsError::code)
//! - [`ServerError`]: a failure reported by the gateway in a dispatch
//!   acknowledgement, enriched with whatever fields the gateway sent
//!
//! Errors are `Clone` because one failed connection attempt is reported to
//! every dispatch that was waiting on it.

use serde_json::{Map, Value};
use thiserror::Error;

/// Code used when the gateway error carries none.
pub const DEFAULT_SERVER_CODE: &str = "SERVER_ERROR";
/// Status used when the gateway error carries none.
pub const DEFAULT_SERVER_STATUS: u16 = 500;
/// Message used when the gateway error carries none.
pub const DEFAULT_SERVER_MESSAGE: &str = "Failed to complete fetch request.";

/// Message attached to credential rejections.
pub const INVALID_KEY_MESSAGE: &str = "Invalid API Key";

// ─────────────────────────────────────────────────────────────────────────────
// EventsError
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level error type for the events client.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EventsError {
    /// Malformed namespace, action name, or matcher. Never retried.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong with the argument.
        message: String,
    },

    /// The gateway rejected the credential. Terminal for the connection.
    #[error("authorization failed: {message}")]
    Authorization {
        /// Human-readable message.
        message: String,
    },

    /// The gateway answered a dispatch with an error.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// The connection went away without a classified cause.
    #[error("disconnected: {reason}")]
    Disconnected {
        /// Raw disconnect reason reported by the transport.
        reason: String,
    },

    /// The transport failed (error event, dropped acknowledgement, send failure).
    #[error("transport error: {message}")]
    Transport {
        /// Transport-provided description.
        message: String,
    },

    /// Client configuration could not be resolved.
    #[error("configuration error: {message}")]
    Config {
        /// What was missing or invalid.
        message: String,
    },

    /// The client was closed explicitly.
    #[error("client closed")]
    Closed,
}

impl EventsError {
    /// Build an [`EventsError::InvalidArgument`].
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Build the credential-rejected error.
    #[must_use]
    pub fn authorization() -> Self {
        Self::Authorization {
            message: INVALID_KEY_MESSAGE.to_string(),
        }
    }

    /// Build an [`EventsError::Transport`].
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidArgument { .. } => "DATA.INVALID",
            Self::Authorization { .. } => "AUTHORIZATION",
            Self::Server(e) => &e.code,
            Self::Disconnected { .. } => "DISCONNECTED",
            Self::Transport { .. } => "TRANSPORT",
            Self::Config { .. } => "CONFIG",
            Self::Closed => "CLOSED",
        }
    }

    /// Whether this error ends the connection for good.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Authorization { .. } | Self::Closed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ServerError
// ─────────────────────────────────────────────────────────────────────────────

/// Error reported by the gateway in a dispatch acknowledgement.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("[{code}] {message}")]
pub struct ServerError {
    /// Gateway error code, `SERVER_ERROR` when absent.
    pub code: String,
    /// HTTP-like status, `500` when absent.
    pub status: u16,
    /// Human-readable message.
    pub message: String,
    /// Any other fields the gateway attached to the error.
    pub fields: Map<String, Value>,
}

impl ServerError {
    /// Build a `ServerError` from the raw error value of an acknowledgement.
    ///
    /// Objects contribute `message`, `code`, `status`, and every other field.
    /// Anything else yields a generic error with the defaults. Empty codes
    /// and zero statuses count as absent.
    #[must_use]
    pub fn from_remote(value: Value) -> Self {
        let Value::Object(mut fields) = value else {
            return Self {
                code: DEFAULT_SERVER_CODE.to_string(),
                status: DEFAULT_SERVER_STATUS,
                message: DEFAULT_SERVER_MESSAGE.trim_end_matches('.').to_string(),
                fields: Map::new(),
            };
        };

        let message = fields
            .remove("message")
            .and_then(|v| v.as_str().filter(|s| !s.is_empty()).map(String::from))
            .unwrap_or_else(|| DEFAULT_SERVER_MESSAGE.to_string());
        let code = fields
            .remove("code")
            .and_then(|v| v.as_str().filter(|s| !s.is_empty()).map(String::from))
            .unwrap_or_else(|| DEFAULT_SERVER_CODE.to_string());
        let status = fields
            .remove("status")
            .and_then(|v| v.as_u64())
            .and_then(|n| u16::try_from(n).ok())
            .filter(|n| *n != 0)
            .unwrap_or(DEFAULT_SERVER_STATUS);

        Self {
            code,
            status,
            message,
            fields,
        }
    }

    /// Look up an extra field the gateway attached.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
