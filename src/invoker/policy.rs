//! Retry policy: attempt budget and exponential backoff schedule

use std::time::Duration;

use crate::config::RetryConfig;

/// Bounded exponential backoff.
///
/// After the failed attempt with 0-based index `i` the invoker waits
/// `initial_delay * backoff_multiplier^i` before the next attempt, so
/// 1000ms with a multiplier of 2 waits 1000, 2000, 4000, 8000ms.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
    retry_client_errors: bool,
    deadline: Option<Duration>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PolicyError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("backoff multiplier must be a finite number >= 1, got {0}")]
    InvalidMultiplier(f64),
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        backoff_multiplier: f64,
    ) -> Result<Self, PolicyError> {
        if max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if !backoff_multiplier.is_finite() || backoff_multiplier < 1.0 {
            return Err(PolicyError::InvalidMultiplier(backoff_multiplier));
        }
        Ok(Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
            retry_client_errors: false,
            deadline: None,
        })
    }

    /// One attempt, no waiting
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            retry_client_errors: false,
            deadline: None,
        }
    }

    /// Retry 4xx responses too, not only 408 and 429
    pub fn with_retry_client_errors(mut self, retry: bool) -> Self {
        self.retry_client_errors = retry;
        self
    }

    /// Bound the whole attempt sequence, waits included
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    pub fn retry_client_errors(&self) -> bool {
        self.retry_client_errors
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Whether another attempt is allowed after the attempt at `attempt_index` failed
    pub fn has_attempt_after(&self, attempt_index: u32) -> bool {
        attempt_index.saturating_add(1) < self.max_attempts
    }

    /// Wait after the failed attempt at `attempt_index` (0-based)
    pub fn delay_after(&self, attempt_index: u32) -> Duration {
        let exponent = i32::try_from(attempt_index).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.powi(exponent);
        let secs = self.initial_delay.as_secs_f64() * factor;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Sum of every wait the policy can impose
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|i| self.delay_after(i))
            .fold(Duration::ZERO, |acc, d| acc.saturating_add(d))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            retry_client_errors: false,
            deadline: None,
        }
    }
}

impl TryFrom<&RetryConfig> for RetryPolicy {
    type Error = PolicyError;

    fn try_from(config: &RetryConfig) -> Result<Self, Self::Error> {
        Ok(RetryPolicy::new(
            config.max_attempts,
            config.initial_delay(),
            config.backoff_multiplier,
        )?
        .with_retry_client_errors(config.retry_client_errors)
        .with_deadline(config.deadline()))
    }
}
