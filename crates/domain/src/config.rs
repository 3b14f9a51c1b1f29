//! Gateway configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use ssogate_common::{duration_millis, duration_secs};

use crate::constants::{
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_MAX_REDIRECTS, DEFAULT_QUERY_CEILING, DEFAULT_USER_AGENT,
};
use crate::errors::{GateError, Result};
use crate::types::TunnelVariant;

/// Gateway configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Tunnel gateway used when a credential does not name one
    pub tunnel: Option<TunnelVariant>,
    pub http: HttpConfig,
    pub retry: RetrySettings,
    pub endpoints: EndpointOverrides,
    /// Base64 DER public key replacing the built-in BYKC key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsa_public_key: Option<String>,
}

/// Blocking HTTP client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(rename = "timeout_secs", with = "duration_secs")]
    pub timeout: Duration,
    pub user_agent: String,
    /// Hop limit for manually followed redirect chains
    pub max_redirects: u32,
}

/// Retry budget for query operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub query_ceiling: u32,
    #[serde(rename = "query_backoff_ms", with = "duration_millis")]
    pub query_backoff: Duration,
}

/// Base-URL overrides; unset entries derive from the tunnel variant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tunnel_gateway: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bykc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwxt: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { query_ceiling: DEFAULT_QUERY_CEILING, query_backoff: Duration::ZERO }
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retry.query_ceiling == 0 {
            return Err(GateError::config("retry.query_ceiling must be greater than 0"));
        }
        if self.http.max_redirects == 0 {
            return Err(GateError::config("http.max_redirects must be greater than 0"));
        }
        if self.http.timeout.is_zero() {
            return Err(GateError::config("http.timeout_secs must be greater than 0"));
        }
        Ok(())
    }
}
