//! Clock capability consumed by time-capped policies.
//!
//! Policies never read ambient time. Every operation that needs "now" takes a
//! [`Clock`] explicitly, so tests and simulations can drive deadlines exactly.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A monotonic source of time in milliseconds.
///
/// Implementations must be non-decreasing. The origin is arbitrary: only
/// differences between readings are meaningful.
///
/// Any `Fn() -> u64` closure is a clock:
///
/// ```rust
/// use retryplan::Clock;
///
/// let fixed = || 42_u64;
/// assert_eq!(fixed.now_millis(), 42);
/// ```
pub trait Clock {
    /// Current time in milliseconds.
    fn now_millis(&self) -> u64;
}

impl<F> Clock for F
where
    F: Fn() -> u64,
{
    fn now_millis(&self) -> u64 {
        self()
    }
}

/// Real monotonic clock backed by [`Instant`], anchored at creation.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose zero is the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Manually driven clock.
///
/// Clones share the same reading, so a test can hand one clone to the code
/// under test and advance time through another.
///
/// ```rust
/// use retryplan::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new(1_000);
/// clock.advance(Duration::from_millis(250));
/// assert_eq!(clock.now_millis(), 1_250);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock reading `start` milliseconds.
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        // fetch_update never fails with a closure that always returns Some
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(by))
            });
    }

    /// Jump to an absolute reading. Readings before the current one are ignored.
    pub fn set(&self, millis: u64) {
        self.now.fetch_max(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(10);
        let observer = clock.clone();

        clock.advance(Duration::from_millis(5));
        assert_eq!(observer.now_millis(), 15);

        observer.set(100);
        assert_eq!(clock.now_millis(), 100);
    }

    #[test]
    fn test_manual_clock_is_monotonic() {
        let clock = ManualClock::new(500);
        clock.set(200);
        assert_eq!(clock.now_millis(), 500);
    }

    #[test]
    fn test_monotonic_clock_non_decreasing() {
        let clock = MonotonicClock::new();
        let first = clock.now_millis();
        let second = clock.now_millis();
        assert!(second >= first);
    }

    #[test]
    fn test_closure_and_trait_object_clocks() {
        let closure = || 7_u64;
        assert_eq!(closure.now_millis(), 7);

        let manual = ManualClock::new(3);
        let by_ref: &dyn Clock = &manual;
        assert_eq!(by_ref.now_millis(), 3);
    }
}
