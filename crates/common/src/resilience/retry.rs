//! Refresh-aware retry orchestration for session-backed calls
//!
//! Every call made through an authenticated session can fail because the
//! session silently expired on the server. The [`RetryOrchestrator`] wraps one
//! logical operation and, between attempts, asks the owning client to
//! [`Refresh`] itself. Two disciplines are offered:
//!
//! - [`RetryOrchestrator::query`] for idempotent reads: up to the configured
//!   ceiling of attempts, returning `Ok(None)` once the ceiling is exhausted.
//! - [`RetryOrchestrator::command`] for state-mutating calls: one attempt, one
//!   refresh, one more attempt. Never a third submission.
//!
//! Which failures are worth another attempt is decided by a [`RetryPolicy`].
//! Operations are synchronous; the orchestrator blocks the calling thread for
//! any configured backoff.

use std::fmt;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::error::ErrorClassification;

/// Errors raised while assembling a retry configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// The retry configuration is invalid
    #[error("Invalid retry configuration: {message}")]
    InvalidConfiguration { message: String },
}

/// A client whose session can be rebuilt between attempts.
pub trait Refresh {
    /// Error produced by both the refresh and the wrapped operations.
    type Error;

    /// Re-authenticate and replace the in-memory session.
    ///
    /// Implementations must leave the previous session in place when this
    /// returns an error.
    fn refresh(&mut self) -> Result<(), Self::Error>;
}

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    /// Decide what to do after `error` on the given 1-based attempt.
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Refresh and retry while the attempt budget allows
    Retry,
    /// Refresh and retry at most once for this invocation, then surface
    RetryOnce,
    /// Surface the error immediately
    Stop,
}

/// Backoff strategy for calculating the pause between attempts
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// Linear backoff: initial_delay + (attempt * increment)
    Linear { initial_delay: Duration, increment: Duration },
    /// Exponential backoff: initial_delay * base^attempt, capped at max_delay
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
}

impl BackoffStrategy {
    /// No pause at all.
    pub const NONE: BackoffStrategy = BackoffStrategy::Fixed(Duration::ZERO);

    /// Calculate the delay after the given 0-based retry index
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed(delay) => *delay,
            BackoffStrategy::Linear { initial_delay, increment } => {
                *initial_delay + increment.saturating_mul(attempt)
            }
            BackoffStrategy::Exponential { initial_delay, base, max_delay } => {
                let delay = initial_delay.as_millis() as f64 * base.powi(attempt as i32);
                let delay_ms = delay.min(max_delay.as_millis() as f64) as u64;
                Duration::from_millis(delay_ms)
            }
        }
    }
}

/// Configuration for the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum attempts for a query operation (commands always get two)
    pub query_ceiling: u32,
    /// Pause between query attempts
    pub backoff: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { query_ceiling: 3, backoff: BackoffStrategy::NONE }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RetryError> {
        if self.query_ceiling == 0 {
            return Err(RetryError::InvalidConfiguration {
                message: "query_ceiling must be greater than 0".to_string(),
            });
        }

        match &self.backoff {
            BackoffStrategy::Exponential { base, .. } if *base <= 0.0 => {
                return Err(RetryError::InvalidConfiguration {
                    message: "exponential base must be greater than 0".to_string(),
                });
            }
            _ => {}
        }

        Ok(())
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn query_ceiling(mut self, attempts: u32) -> Self {
        self.config.query_ceiling = attempts;
        self
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn linear_backoff(mut self, initial_delay: Duration, increment: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Linear { initial_delay, increment };
        self
    }

    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        base: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, base, max_delay };
        self
    }

    pub fn build(self) -> Result<RetryConfig, RetryError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Attempt bookkeeping for a single logical invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    /// Attempts made so far (1-based once the first attempt starts)
    pub attempt: u32,
    /// Maximum attempts allowed for this invocation
    pub ceiling: u32,
    /// Whether a `RetryOnce` allowance has been spent
    pub once_used: bool,
}

impl RetryState {
    pub fn new(ceiling: u32) -> Self {
        Self { attempt: 0, ceiling, once_used: false }
    }

    /// Whether no further attempt fits in the ceiling.
    pub fn exhausted(&self) -> bool {
        self.attempt >= self.ceiling
    }

    fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Apply a decision; returns `true` when another attempt may follow.
    fn admit(&mut self, decision: RetryDecision) -> bool {
        match decision {
            RetryDecision::Stop => false,
            RetryDecision::RetryOnce if self.once_used => false,
            RetryDecision::RetryOnce => {
                self.once_used = true;
                true
            }
            RetryDecision::Retry => true,
        }
    }
}

/// Runs query and command operations against a refreshable client
#[derive(Debug, Clone)]
pub struct RetryOrchestrator<P> {
    config: RetryConfig,
    policy: P,
}

/// Attempts allowed for a command: the first attempt and one post-refresh retry.
pub const COMMAND_ATTEMPTS: u32 = 2;

impl<P> RetryOrchestrator<P> {
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    /// Create with default configuration
    pub fn with_policy(policy: P) -> Self {
        Self::new(RetryConfig::default(), policy)
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run an idempotent read with the bounded refresh-and-retry loop.
    ///
    /// Returns `Ok(None)` once every attempt up to the ceiling has failed with
    /// a retryable error. Errors the policy stops on are returned as-is.
    #[instrument(skip(self, client, operation), fields(ceiling = self.config.query_ceiling))]
    pub fn query<C, T, F>(
        &self,
        name: &str,
        client: &mut C,
        mut operation: F,
    ) -> Result<Option<T>, C::Error>
    where
        C: Refresh,
        C::Error: fmt::Display,
        P: RetryPolicy<C::Error>,
        F: FnMut(&mut C) -> Result<T, C::Error>,
    {
        let mut state = RetryState::new(self.config.query_ceiling);

        loop {
            let attempt = state.begin_attempt();
            debug!(attempt, ceiling = state.ceiling, "executing query");

            let error = match operation(client) {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "query succeeded after refresh");
                    }
                    return Ok(Some(value));
                }
                Err(error) => error,
            };

            if !state.admit(self.policy.should_retry(&error, attempt)) {
                debug!(attempt, error = %error, "retry policy stopped query");
                return Err(error);
            }

            if state.exhausted() {
                warn!(attempts = attempt, error = %error, "query attempts exhausted");
                return Ok(None);
            }

            warn!(attempt, error = %error, "query failed, refreshing session");
            if let Err(refresh_error) = client.refresh() {
                if self.policy.should_retry(&refresh_error, attempt) == RetryDecision::Stop {
                    warn!(error = %refresh_error, "session refresh failed terminally");
                    return Err(refresh_error);
                }
                warn!(error = %refresh_error, "session refresh failed, keeping previous session");
            }

            self.pause(attempt);
        }
    }

    /// Run a state-mutating call: attempt, refresh once, attempt once more.
    #[instrument(skip(self, client, operation))]
    pub fn command<C, T, F>(&self, name: &str, client: &mut C, mut operation: F) -> Result<T, C::Error>
    where
        C: Refresh,
        C::Error: fmt::Display,
        P: RetryPolicy<C::Error>,
        F: FnMut(&mut C) -> Result<T, C::Error>,
    {
        let mut state = RetryState::new(COMMAND_ATTEMPTS);

        let first = state.begin_attempt();
        let error = match operation(client) {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !state.admit(self.policy.should_retry(&error, first)) {
            debug!(error = %error, "retry policy stopped command");
            return Err(error);
        }

        warn!(error = %error, "command failed, refreshing session before the single retry");
        client.refresh()?;

        let second = state.begin_attempt();
        debug!(attempt = second, "re-issuing command");
        operation(client).inspect_err(|error| {
            warn!(attempts = second, error = %error, "command failed after refresh");
        })
    }

    fn pause(&self, attempt: u32) {
        let delay = self.config.backoff.calculate_delay(attempt - 1);
        if !delay.is_zero() {
            debug!(?delay, "backing off before next attempt");
            thread::sleep(delay);
        }
    }
}

/// Pre-defined retry policies
pub mod policies {
    use super::*;

    /// Retries whatever the error's own classification calls retryable
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ClassifiedRetry;

    impl<E: ErrorClassification> RetryPolicy<E> for ClassifiedRetry {
        fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
            if error.is_retryable() {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }

    /// Always retry policy - retries on any error
    #[derive(Debug, Clone, Copy, Default)]
    pub struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }
}
