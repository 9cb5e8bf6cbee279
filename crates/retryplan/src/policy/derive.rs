//! Retry counts derived from a total time budget.
//!
//! Instead of simulating every step, the count is obtained in closed form:
//! plain division for fixed waits, and inversion of the finite geometric
//! series for exponential growth, split into an uncapped phase and a phase
//! running at `max_timeout`.
//!
//! All counts truncate toward zero. Non-positive results clamp to `0`, which
//! callers turn into an already exhausted policy.

use crate::error::{PolicyError, Result};
use crate::policy::millis;
use std::time::Duration;

/// Upper bound for corrected counts, results saturate here anyway.
const COUNT_LIMIT: f64 = u32::MAX as f64;

/// Number of fixed waits of `timeout` that fit in `budget`.
///
/// # Errors
///
/// Returns [`PolicyError::InvalidPolicy`] if `timeout` is shorter than one
/// millisecond.
///
/// # Examples
///
/// ```rust
/// use retryplan::policy::derive::linear_retries;
/// use std::time::Duration;
///
/// let retries = linear_retries(Duration::from_millis(1000), Duration::from_millis(300)).unwrap();
/// assert_eq!(retries, 3);
/// ```
pub fn linear_retries(budget: Duration, timeout: Duration) -> Result<u32> {
    let timeout_ms = millis(timeout);
    if timeout_ms == 0 {
        return Err(PolicyError::invalid_policy(
            "deriving retries from a total timeout requires a positive timeout",
        ));
    }
    Ok(saturate(millis(budget) / timeout_ms))
}

/// Number of exponentially growing waits that fit in `budget`.
///
/// The first wait is `timeout`, each following one is multiplied by
/// `factor` and capped at `max_timeout` (`None` is unbounded).
///
/// # Errors
///
/// Returns [`PolicyError::InvalidPolicy`] if `factor` is not finite, is
/// below `1.0`, or if the effective first wait is shorter than one
/// millisecond.
///
/// # Examples
///
/// ```rust
/// use retryplan::policy::derive::exponential_retries;
/// use std::time::Duration;
///
/// // 100 + 200 + 400 = 700, the fourth wait (capped at 500) would overflow.
/// let retries = exponential_retries(
///     Duration::from_millis(1000),
///     Duration::from_millis(100),
///     2.0,
///     Some(Duration::from_millis(500)),
/// )
/// .unwrap();
/// assert_eq!(retries, 3);
/// ```
pub fn exponential_retries(
    budget: Duration,
    timeout: Duration,
    factor: f64,
    max_timeout: Option<Duration>,
) -> Result<u32> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(PolicyError::invalid_policy(format!(
            "factor must be a positive finite number, got {factor}"
        )));
    }

    let first = millis(timeout);
    let cap = max_timeout.map(millis);

    // No growth before the cap applies: this is a fixed wait.
    if factor == 1.0 || cap.is_some_and(|cap| cap <= first) {
        let effective = cap.map_or(first, |cap| cap.min(first));
        return linear_retries(budget, Duration::from_millis(effective));
    }

    if factor < 1.0 {
        return Err(PolicyError::invalid_policy(format!(
            "deriving retries from a total timeout requires factor >= 1, got {factor}"
        )));
    }
    if first == 0 {
        return Err(PolicyError::invalid_policy(
            "deriving retries from a total timeout requires a positive timeout",
        ));
    }

    let budget = millis(budget) as f64;
    let b1 = first as f64;
    let q = factor;

    let geometric = |steps: f64| b1 * (q.powf(steps) - 1.0) / (q - 1.0);

    // Steps that fit under pure geometric growth.
    let n = exact_floor(
        (budget * (q - 1.0) / b1 + 1.0).ln() / q.ln(),
        |steps| geometric(steps) <= budget,
    );

    let Some(cap) = cap else {
        return Ok(clamp(n));
    };
    let cap = cap as f64;

    // 1-based step at which the geometric wait first reaches the cap.
    let m = exact_floor((cap / b1).ln() / q.ln() + 1.0, |step| {
        step < 1.0 || b1 * q.powf(step - 1.0) <= cap
    });
    if n < m {
        return Ok(clamp(n));
    }

    let uncapped = geometric(m - 1.0);
    let retries = exact_floor((budget - uncapped + (m - 1.0) * cap) / cap, |steps| {
        uncapped + (steps - (m - 1.0)) * cap <= budget
    });
    Ok(clamp(retries))
}

/// Truncates `estimate`, then moves it to the largest count accepted by `fits`.
///
/// Logarithm ratios land a hair off integers in floating point, so the
/// truncated estimate can be one step too high or too low at an exact sum.
fn exact_floor(estimate: f64, fits: impl Fn(f64) -> bool) -> f64 {
    let mut count = if estimate.is_nan() {
        0.0
    } else {
        estimate.trunc().clamp(0.0, COUNT_LIMIT)
    };
    while count > 0.0 && !fits(count) {
        count -= 1.0;
    }
    while count < COUNT_LIMIT && fits(count + 1.0) {
        count += 1.0;
    }
    count
}

fn clamp(count: f64) -> u32 {
    if count.is_nan() || count <= 0.0 {
        0
    } else if count >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        count as u32
    }
}

fn saturate(count: u64) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}
