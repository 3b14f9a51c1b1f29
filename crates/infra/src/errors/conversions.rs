//! Conversions from external infrastructure errors into gateway errors.

use reqwest::Error as HttpError;
use ssogate_domain::GateError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub GateError);

impl From<InfraError> for GateError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<GateError> for InfraError {
    fn from(value: GateError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoGateError {
    fn into_gate(self) -> GateError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → GateError */
/* -------------------------------------------------------------------------- */

impl IntoGateError for HttpError {
    fn into_gate(self) -> GateError {
        if self.is_timeout() {
            return GateError::Transport("HTTP request timed out".into());
        }

        if self.is_connect() {
            return GateError::Transport("HTTP connection failure".into());
        }

        if self.is_builder() {
            return GateError::Config(format!("invalid HTTP request: {self}"));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));
            return GateError::Transport(message);
        }

        if self.is_decode() || self.is_body() {
            return GateError::Transport(format!("failed to read response body: {self}"));
        }

        GateError::Transport(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_gate())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json → GateError */
/* -------------------------------------------------------------------------- */

impl IntoGateError for serde_json::Error {
    fn into_gate(self) -> GateError {
        GateError::protocol(None, format!("invalid JSON: {self}"))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(value.into_gate())
    }
}

/// Map any convertible error straight into a [`GateError`].
pub fn gate<E>(err: E) -> GateError
where
    InfraError: From<E>,
{
    InfraError::from(err).into()
}
