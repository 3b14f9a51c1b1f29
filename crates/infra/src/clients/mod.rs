//! Backend service clients
//!
//! Both clients own an [`AuthenticatedSession`] and route every call through
//! the [`RetryOrchestrator`](ssogate_common::RetryOrchestrator): reads use the
//! bounded query loop, writes the single refresh-and-retry command path.

pub mod bykc;
pub mod jwxt;
pub mod policy;
pub mod session;

use serde_json::{Map, Value};
use ssogate_common::{Refresh, RetryConfig};
use ssogate_domain::{GateError, LoginForm, Result, RetrySettings};
use url::Url;

pub use bykc::BykcClient;
pub use jwxt::JwxtClient;
pub use policy::GatePolicy;
pub use session::AuthenticatedSession;

/// Body of an outgoing service request
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Form(LoginForm),
    Json(Value),
}

impl RequestBody {
    /// JSON view of the body; form fields become string members.
    pub fn into_json(self) -> Value {
        match self {
            Self::Empty => Value::Object(Map::new()),
            Self::Form(form) => Value::Object(
                form.fields()
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::String(value.clone())))
                    .collect(),
            ),
            Self::Json(value) => value,
        }
    }
}

/// Capability shared by every session-backed backend client
///
/// `refresh` comes from [`Refresh`]: it re-runs the login ceremony and
/// redemption, replacing the session only when both succeed. Every request
/// carries the tunnel cookies, then the service cookies, then the backend's
/// own auth headers.
pub trait ServiceClient: Refresh<Error = GateError> {
    type Output;

    fn get(&mut self, url: &Url) -> Result<Self::Output>;

    fn post(&mut self, url: &Url, body: RequestBody) -> Result<Self::Output>;
}

pub(crate) fn retry_config(settings: &RetrySettings) -> Result<RetryConfig> {
    RetryConfig::builder()
        .query_ceiling(settings.query_ceiling)
        .fixed_backoff(settings.query_backoff)
        .build()
        .map_err(|e| GateError::config(e.to_string()))
}
