//! Retry policies and their step-advance state machine.
//!
//! A [`Policy`] is an immutable value. Asking it for the next wait with
//! [`Policy::advance`] returns a [`Step`]: either a wait together with the
//! policy to use next time, or [`Step::Exhausted`].
//!
//! # Key Types
//!
//! - [`Policy`] - The closed set of policy shapes
//! - [`Step`] - Outcome of one advance
//! - [`RetryLimit`] - How many retries a constructor should allow
//! - [`ExponentialBuilder`] - Fluent construction of exponential backoff
//!
//! # Examples
//!
//! ```rust
//! use retryplan::{Policy, RetryLimit};
//! use std::time::Duration;
//!
//! let policy = Policy::exponential(
//!     RetryLimit::Count(4),
//!     2.0,
//!     Duration::from_millis(100),
//!     Some(Duration::from_millis(500)),
//! )
//! .unwrap();
//!
//! let waits: Vec<u128> = policy
//!     .all_waits()
//!     .unwrap()
//!     .iter()
//!     .map(Duration::as_millis)
//!     .collect();
//! assert_eq!(waits, vec![100, 200, 400, 500]);
//! ```

mod advance;
pub(crate) mod builder;
pub mod derive;

pub use advance::{Step, Waits};
pub use builder::ExponentialBuilder;

use crate::clock::Clock;
use crate::error::{PolicyError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remaining retries of a linear or exponential policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retries {
    /// A finite number of retries left.
    Limited(u32),
    /// Retry forever.
    Unlimited,
}

impl Retries {
    /// Consume one retry. `None` when nothing is left.
    fn consume(self) -> Option<Self> {
        match self {
            Self::Limited(0) => None,
            Self::Limited(n) => Some(Self::Limited(n - 1)),
            Self::Unlimited => Some(Self::Unlimited),
        }
    }

    fn is_spent(self) -> bool {
        self == Self::Limited(0)
    }
}

/// Retry limit requested from a constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    /// Exactly this many retries. Must be positive.
    Count(u32),
    /// Never run out of retries.
    Unlimited,
    /// As many retries as fit in this total amount of waiting.
    ///
    /// The count is derived once, at construction, see [`derive`].
    TotalTimeout(Duration),
}

/// A retry/backoff plan.
///
/// Waits have millisecond granularity. Clock instants (`last_tick`,
/// `deadline`) are milliseconds as reported by the [`Clock`] that built the
/// policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Policy {
    /// Fixed wait, repeated.
    Linear {
        /// Retries left
        retries: Retries,
        /// Wait emitted on every step
        timeout: Duration,
    },

    /// Wait multiplied by `factor` after each step, up to `max_timeout`.
    Exponential {
        /// Retries left
        retries: Retries,
        /// Growth factor applied after each step
        factor: f64,
        /// Wait emitted on the next step
        timeout: Duration,
        /// Upper bound for the wait (`None` is unbounded)
        max_timeout: Option<Duration>,
    },

    /// Explicit waits consumed front to back.
    Intervals {
        /// Waits still to be emitted
        remaining: Vec<Duration>,
    },

    /// Sub-policies run one after another.
    Sequence {
        /// Sub-policies, the first one is the active one
        policies: Vec<Policy>,
    },

    /// Wall-clock budget around another policy.
    TimeCap {
        /// Instant at which the last emitted wait ends
        last_tick: u64,
        /// No wait may end after this instant
        deadline: u64,
        /// Wrapped policy
        inner: Box<Policy>,
    },

    /// No more retries.
    Exhausted,
}

impl Policy {
    /// Fixed wait of `timeout`, repeated according to `limit`.
    ///
    /// # Errors
    ///
    /// [`PolicyError::InvalidPolicy`] if `limit` is `Count(0)`, or if a
    /// `TotalTimeout` is combined with a zero timeout.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use retryplan::{Policy, RetryLimit};
    /// use std::time::Duration;
    ///
    /// let policy = Policy::linear(
    ///     RetryLimit::TotalTimeout(Duration::from_millis(1000)),
    ///     Duration::from_millis(300),
    /// )
    /// .unwrap();
    /// assert_eq!(policy.all_waits().unwrap().len(), 3);
    /// ```
    pub fn linear(limit: RetryLimit, timeout: Duration) -> Result<Self> {
        let retries = match limit {
            RetryLimit::TotalTimeout(budget) => derive::linear_retries(budget, timeout)?,
            other => return Ok(Self::Linear { retries: requested(other)?, timeout }),
        };
        Ok(with_derived(retries, |retries| Self::Linear { retries, timeout }))
    }

    /// Exponential backoff starting at `timeout`, growing by `factor`.
    ///
    /// A `timeout` above `max_timeout` is lowered to `max_timeout`, so no
    /// emitted wait ever exceeds the cap.
    ///
    /// # Errors
    ///
    /// [`PolicyError::InvalidPolicy`] if `factor` is not a positive finite
    /// number, if `limit` is `Count(0)`, or if the budget cannot be converted
    /// to a retry count (see [`derive::exponential_retries`]).
    pub fn exponential(
        limit: RetryLimit,
        factor: f64,
        timeout: Duration,
        max_timeout: Option<Duration>,
    ) -> Result<Self> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(PolicyError::invalid_policy(format!(
                "factor must be a positive finite number, got {factor}"
            )));
        }
        let timeout = max_timeout.map_or(timeout, |cap| timeout.min(cap));

        let build = |retries| Self::Exponential {
            retries,
            factor,
            timeout,
            max_timeout,
        };
        match limit {
            RetryLimit::TotalTimeout(budget) => Ok(with_derived(
                derive::exponential_retries(budget, timeout, factor, max_timeout)?,
                build,
            )),
            other => Ok(build(requested(other)?)),
        }
    }

    /// Builder for [`Policy::Exponential`] with the configuration defaults.
    pub fn exponential_builder() -> ExponentialBuilder {
        ExponentialBuilder::default()
    }

    /// Explicit list of waits, emitted in order.
    ///
    /// # Errors
    ///
    /// [`PolicyError::InvalidPolicy`] if the list is empty or contains a
    /// wait shorter than one millisecond.
    pub fn intervals(waits: impl IntoIterator<Item = Duration>) -> Result<Self> {
        let remaining: Vec<Duration> = waits.into_iter().collect();
        if remaining.is_empty() {
            return Err(PolicyError::invalid_policy("intervals must not be empty"));
        }
        if let Some(position) = remaining.iter().position(|wait| millis(*wait) == 0) {
            return Err(PolicyError::invalid_policy(format!(
                "interval at position {position} must be positive"
            )));
        }
        Ok(Self::Intervals { remaining })
    }

    /// Run `policies` one after another.
    ///
    /// The list is stored as given, nested sequences are not flattened.
    ///
    /// # Errors
    ///
    /// [`PolicyError::InvalidPolicy`] if the list is empty.
    pub fn sequence(policies: impl IntoIterator<Item = Policy>) -> Result<Self> {
        let policies: Vec<Policy> = policies.into_iter().collect();
        if policies.is_empty() {
            return Err(PolicyError::invalid_policy("sequence must not be empty"));
        }
        Ok(Self::Sequence { policies })
    }

    /// Bound `policy` by a wall-clock `budget` starting now.
    ///
    /// `None` leaves the policy unchanged. A zero budget yields an exhausted
    /// policy.
    ///
    /// ```rust
    /// use retryplan::{ManualClock, Policy, RetryLimit};
    /// use std::time::Duration;
    ///
    /// let clock = ManualClock::new(1_000);
    /// let linear = Policy::linear(RetryLimit::Unlimited, Duration::from_millis(100)).unwrap();
    /// let capped = Policy::with_time_cap(Some(Duration::from_millis(250)), linear, &clock);
    ///
    /// assert!(matches!(capped, Policy::TimeCap { deadline: 1_250, .. }));
    /// ```
    pub fn with_time_cap<C>(budget: Option<Duration>, policy: Policy, clock: &C) -> Self
    where
        C: Clock + ?Sized,
    {
        let Some(budget) = budget else {
            return policy;
        };
        let budget = millis(budget);
        if budget == 0 {
            return Self::Exhausted;
        }

        let now = clock.now_millis();
        Self::TimeCap {
            last_tick: now,
            deadline: now.saturating_add(budget),
            inner: Box::new(policy),
        }
    }

    /// Returns `true` for [`Policy::Exhausted`].
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }

    /// Returns `true` if a [`Policy::TimeCap`] appears anywhere in the tree.
    pub fn contains_time_cap(&self) -> bool {
        match self {
            Self::TimeCap { .. } => true,
            Self::Sequence { policies } => policies.iter().any(Self::contains_time_cap),
            _ => false,
        }
    }

    /// Returns `true` if the policy can produce waits forever.
    pub fn is_unbounded(&self) -> bool {
        match self {
            Self::Linear { retries, .. } | Self::Exponential { retries, .. } => {
                *retries == Retries::Unlimited
            }
            Self::Sequence { policies } => policies.iter().any(Self::is_unbounded),
            Self::TimeCap { inner, .. } => inner.is_unbounded(),
            Self::Intervals { .. } | Self::Exhausted => false,
        }
    }
}

fn requested(limit: RetryLimit) -> Result<Retries> {
    match limit {
        RetryLimit::Count(0) => Err(PolicyError::invalid_policy(
            "retries must be a positive integer",
        )),
        RetryLimit::Count(n) => Ok(Retries::Limited(n)),
        RetryLimit::Unlimited => Ok(Retries::Unlimited),
        RetryLimit::TotalTimeout(_) => Err(PolicyError::invalid_policy(
            "total timeout must be derived before use",
        )),
    }
}

fn with_derived(count: u32, build: impl FnOnce(Retries) -> Policy) -> Policy {
    if count == 0 {
        Policy::Exhausted
    } else {
        build(Retries::Limited(count))
    }
}

/// Whole milliseconds in `duration`, saturating.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_linear_constructor() {
        let policy = Policy::linear(RetryLimit::Count(3), ms(100)).unwrap();
        assert_eq!(
            policy,
            Policy::Linear {
                retries: Retries::Limited(3),
                timeout: ms(100)
            }
        );

        let forever = Policy::linear(RetryLimit::Unlimited, Duration::ZERO).unwrap();
        assert!(forever.is_unbounded());
    }

    #[test]
    fn test_zero_count_rejected() {
        assert!(Policy::linear(RetryLimit::Count(0), ms(100)).is_err());
        assert!(Policy::exponential(RetryLimit::Count(0), 2.0, ms(100), None).is_err());
    }

    #[test]
    fn test_linear_from_total_timeout() {
        let policy = Policy::linear(RetryLimit::TotalTimeout(ms(1000)), ms(300)).unwrap();
        assert_eq!(
            policy,
            Policy::Linear {
                retries: Retries::Limited(3),
                timeout: ms(300)
            }
        );
    }

    #[test]
    fn test_budget_too_small_is_exhausted() {
        let policy = Policy::linear(RetryLimit::TotalTimeout(ms(100)), ms(300)).unwrap();
        assert!(policy.is_exhausted());

        let policy =
            Policy::exponential(RetryLimit::TotalTimeout(ms(50)), 2.0, ms(100), None).unwrap();
        assert!(policy.is_exhausted());
    }

    #[test]
    fn test_exponential_validation() {
        assert!(Policy::exponential(RetryLimit::Count(3), 0.0, ms(100), None).is_err());
        assert!(Policy::exponential(RetryLimit::Count(3), -1.0, ms(100), None).is_err());
        assert!(Policy::exponential(RetryLimit::Count(3), f64::INFINITY, ms(100), None).is_err());
        assert!(Policy::exponential(RetryLimit::Count(3), 0.5, ms(100), None).is_ok());
    }

    #[test]
    fn test_exponential_timeout_lowered_to_cap() {
        let policy = Policy::exponential(RetryLimit::Count(3), 2.0, ms(1000), Some(ms(400))).unwrap();
        match policy {
            Policy::Exponential { timeout, .. } => assert_eq!(timeout, ms(400)),
            other => panic!("Expected Exponential, got {other:?}"),
        }
    }

    #[test]
    fn test_intervals_validation() {
        assert!(Policy::intervals(Vec::new()).is_err());
        assert!(Policy::intervals([ms(10), Duration::ZERO]).is_err());
        assert!(Policy::intervals([ms(10), ms(20)]).is_ok());
    }

    #[test]
    fn test_sequence_validation() {
        assert!(Policy::sequence(Vec::new()).is_err());

        let inner = Policy::sequence([Policy::linear(RetryLimit::Count(1), ms(5)).unwrap()]).unwrap();
        let outer = Policy::sequence([inner.clone()]).unwrap();
        // Not flattened
        assert_eq!(
            outer,
            Policy::Sequence {
                policies: vec![inner]
            }
        );
    }

    #[test]
    fn test_with_time_cap() {
        let clock = ManualClock::new(500);
        let linear = Policy::linear(RetryLimit::Count(2), ms(100)).unwrap();

        let unchanged = Policy::with_time_cap(None, linear.clone(), &clock);
        assert_eq!(unchanged, linear);

        let capped = Policy::with_time_cap(Some(ms(1000)), linear.clone(), &clock);
        assert_eq!(
            capped,
            Policy::TimeCap {
                last_tick: 500,
                deadline: 1500,
                inner: Box::new(linear.clone())
            }
        );

        let degenerate = Policy::with_time_cap(Some(Duration::ZERO), linear, &clock);
        assert!(degenerate.is_exhausted());
    }

    #[test]
    fn test_contains_time_cap_at_depth() {
        let clock = ManualClock::new(0);
        let linear = Policy::linear(RetryLimit::Count(2), ms(100)).unwrap();
        let capped = Policy::with_time_cap(Some(ms(1000)), linear.clone(), &clock);

        assert!(!linear.contains_time_cap());
        assert!(capped.contains_time_cap());

        let nested = Policy::sequence([
            linear.clone(),
            Policy::sequence([linear, capped]).unwrap(),
        ])
        .unwrap();
        assert!(nested.contains_time_cap());
    }

    #[test]
    fn test_policy_serde_roundtrip() {
        let clock = ManualClock::new(0);
        let policy = Policy::with_time_cap(
            Some(ms(5000)),
            Policy::sequence([
                Policy::exponential(RetryLimit::Count(4), 2.0, ms(100), Some(ms(500))).unwrap(),
                Policy::intervals([ms(50), ms(200)]).unwrap(),
            ])
            .unwrap(),
            &clock,
        );

        let json = serde_json::to_string(&policy).unwrap();
        let restored: Policy = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, policy);
    }
}
