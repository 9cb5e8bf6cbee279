//! Declarative policy configuration.
//!
//! A [`PolicyConfig`] names exactly one policy kind and its parameters, plus
//! an optional wall-clock budget. It deserializes from any serde format; JSON
//! is supported directly through [`FromStr`].
//!
//! ```json
//! {
//!   "exponential": { "retries": 5, "factor": 2, "timeout": 100, "max_timeout": 1000 },
//!   "timecap": 5000
//! }
//! ```
//!
//! All durations are milliseconds. `retries` accepts a positive integer,
//! `"infinity"`, or `{ "max_total_timeout": <ms> }`; `max_timeout` and
//! `timecap` accept an integer or `"infinity"`.

use crate::clock::Clock;
use crate::error::{PolicyError, Result};
use crate::policy::builder::{DEFAULT_FACTOR, DEFAULT_TIMEOUT};
use crate::policy::{Policy, RetryLimit, millis};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::debug;

/// The `"infinity"` keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Infinity {
    /// No bound.
    Infinity,
}

/// A millisecond bound or `"infinity"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Limit {
    /// Bounded, in milliseconds.
    Millis(u64),
    /// Unbounded.
    Unbounded(Infinity),
}

impl Default for Limit {
    fn default() -> Self {
        Self::Unbounded(Infinity::Infinity)
    }
}

impl Limit {
    /// `None` when unbounded.
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            Self::Millis(ms) => Some(Duration::from_millis(ms)),
            Self::Unbounded(_) => None,
        }
    }
}

/// Retry count setting of a linear or exponential policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RetriesSetting {
    /// Exactly this many retries.
    Count(u32),
    /// Retry forever.
    Unlimited(Infinity),
    /// As many retries as fit in this many milliseconds of waiting.
    TotalTimeout {
        /// Total waiting budget in milliseconds
        max_total_timeout: u64,
    },
}

impl Default for RetriesSetting {
    fn default() -> Self {
        Self::Unlimited(Infinity::Infinity)
    }
}

impl From<RetriesSetting> for RetryLimit {
    fn from(setting: RetriesSetting) -> Self {
        match setting {
            RetriesSetting::Count(count) => Self::Count(count),
            RetriesSetting::Unlimited(_) => Self::Unlimited,
            RetriesSetting::TotalTimeout { max_total_timeout } => {
                Self::TotalTimeout(Duration::from_millis(max_total_timeout))
            }
        }
    }
}

/// Parameters of a linear policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearConfig {
    /// Retry count (default: unlimited)
    #[serde(default)]
    pub retries: RetriesSetting,
    /// Wait in milliseconds (default: 1000)
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self {
            retries: RetriesSetting::default(),
            timeout: default_timeout(),
        }
    }
}

/// Parameters of an exponential policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExponentialConfig {
    /// Retry count (default: unlimited)
    #[serde(default)]
    pub retries: RetriesSetting,
    /// Growth factor (default: 2)
    #[serde(default = "default_factor")]
    pub factor: f64,
    /// First wait in milliseconds (default: 1000)
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Wait cap in milliseconds (default: infinity)
    #[serde(default)]
    pub max_timeout: Limit,
}

impl Default for ExponentialConfig {
    fn default() -> Self {
        Self {
            retries: RetriesSetting::default(),
            factor: default_factor(),
            timeout: default_timeout(),
            max_timeout: Limit::default(),
        }
    }
}

fn default_timeout() -> u64 {
    millis(DEFAULT_TIMEOUT)
}

fn default_factor() -> f64 {
    DEFAULT_FACTOR
}

/// Declarative description of a [`Policy`].
///
/// Exactly one of `sequence`, `linear`, `exponential` and `intervals` must be
/// set. Sequence entries are full configurations themselves and may carry
/// their own `timecap`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Sub-policies run one after another
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<Vec<PolicyConfig>>,
    /// Fixed wait
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linear: Option<LinearConfig>,
    /// Exponential backoff
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exponential: Option<ExponentialConfig>,
    /// Explicit waits in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intervals: Option<Vec<u64>>,
    /// Wall-clock budget in milliseconds around the whole policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timecap: Option<Limit>,
}

impl PolicyConfig {
    /// Configuration for a linear policy.
    pub fn linear(linear: LinearConfig) -> Self {
        Self {
            linear: Some(linear),
            ..Default::default()
        }
    }

    /// Configuration for an exponential policy.
    pub fn exponential(exponential: ExponentialConfig) -> Self {
        Self {
            exponential: Some(exponential),
            ..Default::default()
        }
    }

    /// Configuration for an interval list.
    pub fn intervals(intervals: impl IntoIterator<Item = u64>) -> Self {
        Self {
            intervals: Some(intervals.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Configuration for a sequence.
    pub fn sequence(sequence: impl IntoIterator<Item = PolicyConfig>) -> Self {
        Self {
            sequence: Some(sequence.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Bound the configured policy by `timecap` milliseconds.
    pub fn with_timecap(mut self, timecap: u64) -> Self {
        self.timecap = Some(Limit::Millis(timecap));
        self
    }

    fn kind_error(&self) -> PolicyError {
        let present: Vec<&'static str> = [
            ("sequence", self.sequence.is_some()),
            ("linear", self.linear.is_some()),
            ("exponential", self.exponential.is_some()),
            ("intervals", self.intervals.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect();

        if present.is_empty() {
            PolicyError::invalid_policy(
                "configuration must name one of sequence, linear, exponential or intervals",
            )
        } else {
            PolicyError::invalid_policy(format!(
                "configuration must name exactly one policy kind, found {}",
                present.join(", ")
            ))
        }
    }
}

impl FromStr for PolicyConfig {
    type Err = PolicyError;

    fn from_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Policy {
    /// Build a policy from its declarative configuration.
    ///
    /// The clock is read once for every `timecap` in the configuration.
    ///
    /// # Errors
    ///
    /// [`PolicyError::InvalidPolicy`] if the configuration names no kind or
    /// more than one, or if the parameters are rejected by the matching
    /// constructor.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use retryplan::{ManualClock, Policy, PolicyConfig};
    ///
    /// let config: PolicyConfig = r#"{ "intervals": [50, 200, 1000] }"#.parse().unwrap();
    /// let policy = Policy::from_config(&config, &ManualClock::new(0)).unwrap();
    /// assert_eq!(policy.all_waits().unwrap().len(), 3);
    /// ```
    pub fn from_config<C>(config: &PolicyConfig, clock: &C) -> Result<Self>
    where
        C: Clock + ?Sized,
    {
        let policy = match (
            &config.sequence,
            &config.linear,
            &config.exponential,
            &config.intervals,
        ) {
            (Some(sequence), None, None, None) => {
                let policies = sequence
                    .iter()
                    .map(|entry| Self::from_config(entry, clock))
                    .collect::<Result<Vec<_>>>()?;
                Self::sequence(policies)?
            }
            (None, Some(linear), None, None) => {
                Self::linear(linear.retries.into(), Duration::from_millis(linear.timeout))?
            }
            (None, None, Some(exponential), None) => Self::exponential(
                exponential.retries.into(),
                exponential.factor,
                Duration::from_millis(exponential.timeout),
                exponential.max_timeout.as_duration(),
            )?,
            (None, None, None, Some(intervals)) => {
                Self::intervals(intervals.iter().copied().map(Duration::from_millis))?
            }
            _ => return Err(config.kind_error()),
        };

        let budget = config.timecap.and_then(Limit::as_duration);

        #[cfg(feature = "tracing")]
        debug!(
            unbounded = policy.is_unbounded(),
            timecap_ms = budget.map(millis),
            "Built policy from configuration"
        );

        Ok(Self::with_time_cap(budget, policy, clock))
    }
}
