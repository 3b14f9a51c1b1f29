//! Retry classification for [`GateError`]

use ssogate_common::resilience::{RetryDecision, RetryPolicy};
use ssogate_domain::GateError;
use tracing::warn;

/// Decides whether a failed gateway call is worth another attempt
///
/// Status `"1"` is terminal. Any other non-zero status has no documented
/// meaning, so it is retried once and reported for review.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatePolicy;

impl RetryPolicy<GateError> for GatePolicy {
    fn should_retry(&self, error: &GateError, attempt: u32) -> RetryDecision {
        match error {
            GateError::AuthenticationFailed(_) | GateError::Config(_) | GateError::Internal(_) => {
                RetryDecision::Stop
            }
            GateError::Domain { .. } if error.is_terminal_status() => RetryDecision::Stop,
            GateError::Domain { status, data } => {
                warn!(%status, %data, attempt, "unrecognized backend status, retrying once");
                RetryDecision::RetryOnce
            }
            GateError::Transport(_) | GateError::Protocol { .. } | GateError::SessionExpired(_) => {
                RetryDecision::Retry
            }
        }
    }
}
