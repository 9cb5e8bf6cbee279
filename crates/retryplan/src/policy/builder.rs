//! Fluent construction of exponential backoff policies.

use super::{Policy, RetryLimit};
use crate::error::Result;
use std::time::Duration;

/// Default growth factor.
pub(crate) const DEFAULT_FACTOR: f64 = 2.0;

/// Default first wait for linear and exponential policies.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Builder for [`Policy::Exponential`].
///
/// Unset parameters fall back to the same defaults as the declarative
/// configuration:
/// - `retries`: unlimited
/// - `factor`: 2.0 (doubles each time)
/// - `timeout`: 1000ms
/// - `max_timeout`: unbounded
///
/// # Examples
///
/// ```rust
/// use retryplan::{Policy, RetryLimit};
/// use std::time::Duration;
///
/// let policy = Policy::exponential_builder()
///     .retries(RetryLimit::Count(5))
///     .timeout(Duration::from_millis(100))
///     .max_timeout(Duration::from_secs(30))
///     .factor(1.5)
///     .build()
///     .unwrap();
/// assert_eq!(policy.all_waits().unwrap().len(), 5);
/// ```
#[derive(Debug, Default, Clone)]
pub struct ExponentialBuilder {
    retries: Option<RetryLimit>,
    factor: Option<f64>,
    timeout: Option<Duration>,
    max_timeout: Option<Duration>,
}

impl ExponentialBuilder {
    /// Set how many retries are allowed.
    ///
    /// Default: unlimited
    pub fn retries(mut self, retries: RetryLimit) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Derive the retry count from a total waiting budget.
    ///
    /// Shorthand for `retries(RetryLimit::TotalTimeout(budget))`.
    pub fn max_total_timeout(self, budget: Duration) -> Self {
        self.retries(RetryLimit::TotalTimeout(budget))
    }

    /// Set the growth factor.
    ///
    /// Default: 2.0
    pub fn factor(mut self, factor: f64) -> Self {
        self.factor = Some(factor);
        self
    }

    /// Set the first wait.
    ///
    /// Default: 1000ms
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Cap every wait at `max_timeout`.
    ///
    /// Default: unbounded
    pub fn max_timeout(mut self, max_timeout: Duration) -> Self {
        self.max_timeout = Some(max_timeout);
        self
    }

    /// Build the policy, validating parameters as [`Policy::exponential`] does.
    pub fn build(self) -> Result<Policy> {
        Policy::exponential(
            self.retries.unwrap_or(RetryLimit::Unlimited),
            self.factor.unwrap_or(DEFAULT_FACTOR),
            self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            self.max_timeout,
        )
    }
}
