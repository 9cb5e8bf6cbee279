//! Step-advance state machine.

use super::{Policy, Retries, millis};
use crate::clock::Clock;
use crate::error::{PolicyError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::{debug, trace};

/// Outcome of advancing a policy by one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Wait this long, then retry and advance the returned policy.
    Wait(Duration, Policy),
    /// Give up.
    Exhausted,
}

impl Step {
    /// The wait, if any.
    pub fn wait(&self) -> Option<Duration> {
        match self {
            Self::Wait(wait, _) => Some(*wait),
            Self::Exhausted => None,
        }
    }

    /// The policy to use for the next step.
    pub fn into_policy(self) -> Policy {
        match self {
            Self::Wait(_, next) => next,
            Self::Exhausted => Policy::Exhausted,
        }
    }

    /// Returns `true` for [`Step::Exhausted`].
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }
}

impl Policy {
    /// Compute the next wait.
    ///
    /// `self` is left untouched: the returned [`Step`] carries the policy for
    /// the following call, so one starting policy can drive any number of
    /// independent retry sequences. The clock is only read by
    /// [`Policy::TimeCap`] nodes.
    ///
    /// # Errors
    ///
    /// [`PolicyError::InvalidState`] if the value breaks the policy
    /// invariants, e.g. a deserialized exponential state with a non-positive
    /// factor.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use retryplan::{MonotonicClock, Policy, RetryLimit, Step};
    /// use std::time::Duration;
    ///
    /// let clock = MonotonicClock::new();
    /// let policy = Policy::linear(RetryLimit::Count(1), Duration::from_millis(100)).unwrap();
    ///
    /// let Step::Wait(wait, next) = policy.advance(&clock).unwrap() else {
    ///     panic!("expected a wait");
    /// };
    /// assert_eq!(wait, Duration::from_millis(100));
    /// assert!(next.advance(&clock).unwrap().is_exhausted());
    /// ```
    pub fn advance<C>(&self, clock: &C) -> Result<Step>
    where
        C: Clock + ?Sized,
    {
        match self {
            Self::Linear { retries, timeout } => {
                let timeout = *timeout;
                Ok(match retries.consume() {
                    None => Step::Exhausted,
                    Some(rest) => Step::Wait(
                        timeout,
                        continue_with(rest, |retries| Self::Linear { retries, timeout }),
                    ),
                })
            }

            Self::Exponential {
                retries,
                factor,
                timeout,
                max_timeout,
            } => {
                let factor = *factor;
                if !factor.is_finite() || factor <= 0.0 {
                    return Err(PolicyError::invalid_state(format!(
                        "exponential factor must be a positive finite number, got {factor}"
                    )));
                }
                let Some(rest) = retries.consume() else {
                    return Ok(Step::Exhausted);
                };

                let max_timeout = *max_timeout;
                let next_timeout = grow(*timeout, factor, max_timeout);
                Ok(Step::Wait(
                    *timeout,
                    continue_with(rest, |retries| Self::Exponential {
                        retries,
                        factor,
                        timeout: next_timeout,
                        max_timeout,
                    }),
                ))
            }

            Self::Intervals { remaining } => Ok(match remaining.split_first() {
                None => Step::Exhausted,
                Some((head, [])) => Step::Wait(*head, Self::Exhausted),
                Some((head, tail)) => Step::Wait(
                    *head,
                    Self::Intervals {
                        remaining: tail.to_vec(),
                    },
                ),
            }),

            Self::Sequence { policies } => {
                // Exhausted entries hand over to the next one without a wait.
                for (index, policy) in policies.iter().enumerate() {
                    if let Step::Wait(wait, next) = policy.advance(clock)? {
                        let rest = &policies[index + 1..];
                        let mut remaining = Vec::with_capacity(rest.len() + 1);
                        if !next.is_exhausted() {
                            remaining.push(next);
                        }
                        remaining.extend_from_slice(rest);

                        let next = if remaining.is_empty() {
                            Self::Exhausted
                        } else {
                            Self::Sequence {
                                policies: remaining,
                            }
                        };
                        return Ok(Step::Wait(wait, next));
                    }
                }
                Ok(Step::Exhausted)
            }

            Self::TimeCap {
                last_tick,
                deadline,
                inner,
            } => {
                let now = clock.now_millis();
                let (cooldown, inner) = match inner.advance(clock)? {
                    Step::Wait(cooldown, inner) => (cooldown, inner),
                    Step::Exhausted => return Ok(Step::Exhausted),
                };

                // Time spent since the last tick counts against the wait. A caller
                // back before the previous wait ended still owes the remainder.
                let cooldown = millis(cooldown);
                let adjusted = if now < *last_tick {
                    cooldown.saturating_add(*last_tick - now)
                } else {
                    cooldown.saturating_sub(now - *last_tick)
                };
                let ends_at = now.saturating_add(adjusted);

                if ends_at > *deadline {
                    #[cfg(feature = "tracing")]
                    debug!(
                        now,
                        deadline = *deadline,
                        wait_ms = adjusted,
                        "Time cap reached, policy exhausted"
                    );
                    return Ok(Step::Exhausted);
                }

                #[cfg(feature = "tracing")]
                trace!(
                    wait_ms = adjusted,
                    cooldown_ms = cooldown,
                    remaining_ms = *deadline - ends_at,
                    "Time-capped wait"
                );
                Ok(Step::Wait(
                    Duration::from_millis(adjusted),
                    Self::TimeCap {
                        last_tick: ends_at,
                        deadline: *deadline,
                        inner: Box::new(inner),
                    },
                ))
            }

            Self::Exhausted => Ok(Step::Exhausted),
        }
    }

    /// Lazily iterate over the waits of this policy.
    ///
    /// Each item is produced by one [`Policy::advance`] call, so time-capped
    /// policies observe the real time between calls to `next`.
    pub fn waits<'c, C>(&self, clock: &'c C) -> Waits<'c, C>
    where
        C: Clock + ?Sized,
    {
        Waits {
            state: Some(self.clone()),
            clock,
        }
    }

    /// Every wait of this policy, computed eagerly.
    ///
    /// # Errors
    ///
    /// [`PolicyError::UnsupportedPolicy`] if the policy contains a
    /// [`Policy::TimeCap`] at any depth: a capped policy depends on the real
    /// time elapsing between steps, which a tight loop cannot reproduce.
    /// The same error is returned for policies with unlimited retries, whose
    /// list would never end. No step is taken in either case.
    pub fn all_waits(&self) -> Result<Vec<Duration>> {
        if self.contains_time_cap() {
            return Err(PolicyError::UnsupportedPolicy(
                "cannot list the waits of a time-capped policy, drive it with advance".to_string(),
            ));
        }
        if self.is_unbounded() {
            return Err(PolicyError::UnsupportedPolicy(
                "cannot list the waits of a policy with unlimited retries".to_string(),
            ));
        }

        // Never read: there is no time cap left to consult it.
        let frozen = || 0_u64;
        self.waits(&frozen).collect()
    }
}

/// Iterator returned by [`Policy::waits`].
#[derive(Debug)]
pub struct Waits<'c, C: ?Sized> {
    state: Option<Policy>,
    clock: &'c C,
}

impl<C: ?Sized> Waits<'_, C> {
    /// Policy that will produce the next wait, `None` once exhausted.
    pub fn policy(&self) -> Option<&Policy> {
        self.state.as_ref()
    }
}

impl<C> Iterator for Waits<'_, C>
where
    C: Clock + ?Sized,
{
    type Item = Result<Duration>;

    fn next(&mut self) -> Option<Self::Item> {
        let policy = self.state.take()?;
        match policy.advance(self.clock) {
            Ok(Step::Wait(wait, next)) => {
                self.state = Some(next);
                Some(Ok(wait))
            }
            Ok(Step::Exhausted) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

fn continue_with(retries: Retries, build: impl FnOnce(Retries) -> Policy) -> Policy {
    if retries.is_spent() {
        Policy::Exhausted
    } else {
        build(retries)
    }
}

/// `min(round(timeout * factor), max_timeout)` in whole milliseconds.
fn grow(timeout: Duration, factor: f64, max_timeout: Option<Duration>) -> Duration {
    // Float to integer casts saturate.
    let grown = Duration::from_millis((millis(timeout) as f64 * factor).round() as u64);
    max_timeout.map_or(grown, |cap| grown.min(cap))
}
