//! Retry policy.
//!
//! # Responsibilities
//! - Decide whether a failed attempt may be retried
//! - Carry attempt limit, backoff and timeouts for one logical request
//!
//! # Design Decisions
//! - External cancellation and the overall deadline are never retryable;
//!   they are not transport errors at all (see `executor.rs`)
//! - A per-attempt timeout is a transport error and retries under
//!   `timeouts-only`

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::schema::{RetryConfig, TimeoutConfig};
use crate::http::transport::TransportError;
use crate::resilience::backoff::Backoff;

/// Preset retry predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryPredicate {
    Never,
    TimeoutsOnly,
    /// Timeouts plus 5xx responses.
    #[default]
    TimeoutsAndServerErrors,
    AllErrors,
}

impl RetryPredicate {
    pub fn is_retryable(&self, err: &TransportError) -> bool {
        match self {
            RetryPredicate::Never => false,
            RetryPredicate::TimeoutsOnly => err.is_timeout(),
            RetryPredicate::TimeoutsAndServerErrors => err.is_timeout() || err.is_server_error(),
            RetryPredicate::AllErrors => true,
        }
    }
}

/// Caller-supplied retry predicate.
pub type RetryFn = Arc<dyn Fn(&TransportError) -> bool + Send + Sync>;

/// Limits and timing for one logical request.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Attempts including the first. `0` behaves like `1`.
    pub max_attempts: u32,
    pub retry_on: RetryPredicate,
    pub backoff: Backoff,
    pub attempt_timeout: Option<Duration>,
    /// Overall budget measured from the start of execution.
    pub total_timeout: Option<Duration>,
    custom: Option<RetryFn>,
}

impl RetryPolicy {
    /// One attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            retry_on: RetryPredicate::Never,
            backoff: Backoff::default(),
            attempt_timeout: None,
            total_timeout: None,
            custom: None,
        }
    }

    /// Build from the `[retries]` and `[timeouts]` config sections.
    pub fn from_config(retries: &RetryConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            max_attempts: retries.max_attempts,
            retry_on: retries.retry_on,
            backoff: Backoff::new(
                Duration::from_millis(retries.min_backoff_ms),
                Duration::from_millis(retries.max_backoff_ms),
            )
            .with_growth(retries.growth)
            .with_jitter(retries.jitter),
            attempt_timeout: timeouts.attempt_ms.map(Duration::from_millis),
            total_timeout: timeouts.total_ms.map(Duration::from_millis),
            custom: None,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_retry_on(mut self, predicate: RetryPredicate) -> Self {
        self.retry_on = predicate;
        self.custom = None;
        self
    }

    /// Replace the preset predicate with a custom one.
    #[must_use]
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TransportError) -> bool + Send + Sync + 'static,
    {
        self.custom = Some(Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = Some(timeout);
        self
    }

    /// Attempt limit with `0` normalized to `1`.
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn should_retry(&self, err: &TransportError) -> bool {
        match &self.custom {
            Some(predicate) => predicate(err),
            None => self.retry_on.is_retryable(err),
        }
    }

    /// Whether 5xx responses should be surfaced to the executor as errors.
    pub fn retries_server_errors(&self) -> bool {
        self.custom.is_none() && self.retry_on == RetryPredicate::TimeoutsAndServerErrors
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default(), &TimeoutConfig::default())
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("retry_on", &self.retry_on)
            .field("backoff", &self.backoff)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("total_timeout", &self.total_timeout)
            .field("custom", &self.custom.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
