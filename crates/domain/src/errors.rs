//! Error types used throughout the gateway

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ssogate_common::error::{CommonError, ErrorClassification, ErrorSeverity};
use thiserror::Error;

use crate::constants::TERMINAL_STATUS;

/// Outward error type for every gateway operation
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum GateError {
    /// The SSO definitively rejected the credentials or captcha answer.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The service session is no longer accepted; recovered by a refresh.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// The response could not be decoded as the protocol requires.
    #[error("Protocol error (status {}): {message}", .status.as_deref().unwrap_or("none"))]
    Protocol { status: Option<String>, message: String },

    /// The backend decoded fine but answered with a non-success status.
    #[error("Domain error (status {status}): {data}")]
    Domain { status: String, data: Value },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GateError>;

impl GateError {
    pub fn protocol(status: Option<String>, message: impl Into<String>) -> Self {
        Self::Protocol { status, message: message.into() }
    }

    pub fn domain(status: impl Into<String>, data: Value) -> Self {
        Self::Domain { status: status.into(), data }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::SessionExpired(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Status carried by a protocol or domain error, if any.
    pub fn status(&self) -> Option<&str> {
        match self {
            Self::Protocol { status, .. } => status.as_deref(),
            Self::Domain { status, .. } => Some(status),
            _ => None,
        }
    }

    /// Whether the backend marked this status as final for the request.
    pub fn is_terminal_status(&self) -> bool {
        matches!(self, Self::Domain { status, .. } if status == TERMINAL_STATUS)
    }
}

impl ErrorClassification for GateError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::SessionExpired(_) | Self::Transport(_) | Self::Protocol { .. } => true,
            Self::Domain { .. } => !self.is_terminal_status(),
            Self::AuthenticationFailed(_) | Self::Config(_) | Self::Internal(_) => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::SessionExpired(_) => ErrorSeverity::Info,
            Self::Transport(_) | Self::Protocol { .. } | Self::Domain { .. } => {
                ErrorSeverity::Warning
            }
            Self::AuthenticationFailed(_) | Self::Config(_) => ErrorSeverity::Error,
            Self::Internal(_) => ErrorSeverity::Critical,
        }
    }
}

impl From<CommonError> for GateError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::Config { .. } => Self::Config(err.to_string()),
            CommonError::Crypto { .. } | CommonError::Serialization { .. } => {
                Self::Protocol { status: None, message: err.to_string() }
            }
            CommonError::Internal { .. } => Self::Internal(err.to_string()),
        }
    }
}
