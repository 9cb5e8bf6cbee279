#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Declarative retry and backoff schedules.
//!
//! This crate answers one question for a retry loop: *how long until the next
//! attempt?* A [`Policy`] describes the plan and [`Policy::advance`] returns
//! the next wait together with the policy to ask next time, or
//! [`Step::Exhausted`] once the plan is used up.
//!
//! - **Linear**: the same wait, a fixed number of times or forever
//! - **Exponential**: a wait multiplied by a factor on every step, with an optional cap
//! - **Intervals**: an explicit list of waits
//! - **Sequence**: policies chained one after another
//! - **TimeCap**: any of the above, bounded by a wall-clock budget
//!
//! Retry counts can be derived from a total waiting budget in closed form
//! ([`RetryLimit::TotalTimeout`]), and policies can be described
//! declaratively through [`PolicyConfig`].
//!
//! # Design Philosophy
//!
//! The crate never sleeps, spawns or owns a timer. Policies are plain values:
//! advancing one returns a new value and leaves the original untouched, so a
//! single starting policy can seed any number of concurrent retry loops.
//! Time is only ever read through an injected [`Clock`].
//!
//! # Examples
//!
//! Using the prelude for convenient imports:
//!
//! ```rust
//! use retryplan::prelude::*;
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), PolicyError> {
//! let clock = MonotonicClock::new();
//! let mut policy = Policy::with_time_cap(
//!     Some(Duration::from_secs(10)),
//!     Policy::exponential(RetryLimit::Count(5), 2.0, Duration::from_millis(100), None)?,
//!     &clock,
//! );
//!
//! loop {
//!     // ... attempt the operation, break on success ...
//!     match policy.advance(&clock)? {
//!         Step::Wait(wait, next) => {
//!             // sleep for `wait` with the runtime of your choice
//!             # let _ = wait;
//!             policy = next;
//!             # break;
//!         }
//!         Step::Exhausted => break,
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod policy;


pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ExponentialConfig, Infinity, Limit, LinearConfig, PolicyConfig, RetriesSetting};
pub use error::{PolicyError, Result};
pub use policy::{ExponentialBuilder, Policy, Retries, RetryLimit, Step, Waits};

/// Convenient re-exports of commonly used items.
///
/// Import all core abstractions with:
///
/// ```rust
/// use retryplan::prelude::*;
/// ```
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, MonotonicClock};
    pub use crate::config::PolicyConfig;
    pub use crate::error::PolicyError;
    pub use crate::policy::{Policy, RetryLimit, Step};
}
