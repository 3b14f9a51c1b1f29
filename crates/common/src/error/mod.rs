//! Shared error vocabulary
//!
//! Two pieces live here:
//!
//! - [`CommonError`]: failures of the backend-agnostic building blocks (key
//!   material, envelope decoding, configuration values). Crates with their
//!   own error type convert from it instead of re-declaring these cases.
//! - [`ErrorClassification`] and [`ErrorSeverity`]: how an error is judged by
//!   the retry orchestrator and by log routing.
//!
//! ```rust,ignore
//! #[derive(Debug, thiserror::Error)]
//! pub enum TunnelError {
//!     #[error("gateway re-rendered the sign-in form")]
//!     Rejected,
//!
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//! }
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub type CommonResult<T> = Result<T, CommonError>;

/// Failure of a shared building block
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommonError {
    /// A configured value is unusable (e.g. a public key that is not DER)
    #[error("invalid configuration{}: {message}", field_suffix(.field))]
    Config { field: Option<String>, message: String },

    /// A payload could not be read or written in the named format
    #[error("cannot (de)serialize {format}: {message}")]
    Serialization { format: &'static str, message: String },

    /// Key generation, wrapping, padding, or cipher failure
    #[error("{operation} failed: {message}")]
    Crypto { operation: String, message: String },

    /// An invariant of this crate was broken
    #[error("internal error ({context}): {message}")]
    Internal { context: String, message: String },
}

fn field_suffix(field: &Option<String>) -> String {
    field.as_deref().map(|f| format!(" in `{f}`")).unwrap_or_default()
}

impl CommonError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { field: None, message: message.into() }
    }

    /// Configuration error pinned to one field.
    pub fn config_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config { field: Some(field.into()), message: message.into() }
    }

    pub fn crypto(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Crypto { operation: operation.into(), message: message.into() }
    }

    pub fn internal(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal { context: context.into(), message: message.into() }
    }
}

impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization { format: "JSON", message: err.to_string() }
    }
}

impl From<toml::de::Error> for CommonError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization { format: "TOML", message: err.to_string() }
    }
}

/// How callers should react to an error
pub trait ErrorClassification {
    /// Whether the same call may succeed after a session refresh.
    fn is_retryable(&self) -> bool;

    fn severity(&self) -> ErrorSeverity;

    /// Whether the error points at a bug rather than at the remote side.
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Server-requested pause before the next attempt, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl ErrorClassification for CommonError {
    /// A garbled envelope is worth a fresh attempt under a new key; a bad
    /// configuration value is not.
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Crypto { .. } | Self::Serialization { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Crypto { .. } | Self::Serialization { .. } => ErrorSeverity::Warning,
            Self::Config { .. } => ErrorSeverity::Error,
            Self::Internal { .. } => ErrorSeverity::Critical,
        }
    }
}

/// Log routing level of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        })
    }
}
