use std::time::Duration;

use super::ProviderError;

/// Bounds for retrying transient provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed while failures stay transient.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Exponential delay before the retry that follows the `failures`-th
    /// transient failure (1-based), capped at `max_delay`.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Retry {
        delay: Duration,
        refresh_credentials: bool,
    },
    GiveUp(ProviderError),
}

/// Attempt bookkeeping for one provider request.
///
/// Transient failures consume the attempt budget. An auth failure is retried
/// exactly once with fresh credentials and does not touch that budget.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempts: u32,
    transient_failures: u32,
    credentials_refreshed: bool,
    last_error: Option<ProviderError>,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            transient_failures: 0,
            credentials_refreshed: false,
            last_error: None,
        }
    }

    /// Records the start of an attempt and returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&ProviderError> {
        self.last_error.as_ref()
    }

    pub fn on_failure(&mut self, error: ProviderError) -> RetryDecision {
        self.last_error = Some(error.clone());

        match &error {
            ProviderError::Auth { .. } => {
                if self.credentials_refreshed {
                    RetryDecision::GiveUp(error)
                } else {
                    self.credentials_refreshed = true;
                    RetryDecision::Retry {
                        delay: Duration::ZERO,
                        refresh_credentials: true,
                    }
                }
            }
            ProviderError::Request { .. } => RetryDecision::GiveUp(error),
            ProviderError::RateLimited { .. }
            | ProviderError::Unavailable(_)
            | ProviderError::Timeout { .. } => {
                self.transient_failures += 1;
                if self.transient_failures >= self.policy.max_attempts {
                    return RetryDecision::GiveUp(error);
                }

                let mut delay = self.policy.delay_for(self.transient_failures);
                if let ProviderError::RateLimited {
                    retry_after: Some(hint),
                } = &error
                {
                    delay = delay.max(*hint).min(self.policy.max_delay);
                }

                RetryDecision::Retry {
                    delay,
                    refresh_credentials: false,
                }
            }
        }
    }
}
