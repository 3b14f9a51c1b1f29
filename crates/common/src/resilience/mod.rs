//! Resilience patterns for session-backed calls
//!
//! [`retry`] provides the [`RetryOrchestrator`], the single combinator every
//! service client routes its calls through. It is generic over the client
//! (via [`Refresh`]) and over the error type (via [`RetryPolicy`]), so it
//! carries no knowledge of any particular backend.

pub mod retry;

pub use retry::{
    policies, BackoffStrategy, Refresh, RetryConfig, RetryConfigBuilder, RetryDecision,
    RetryError, RetryOrchestrator, RetryPolicy, RetryState, COMMAND_ATTEMPTS,
};
