//! Example: Driving a retry loop with a policy
//!
//! This example demonstrates:
//! 1. A caller-owned retry loop around an unreliable operation
//! 2. A policy loaded from JSON configuration with a wall-clock budget
//! 3. Listing the schedule of a policy up front
//!
//! Run with:
//! ```bash
//! cargo run -p retryplan --example retry_loop
//! ```

use retryplan::prelude::*;
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// A simulated API that fails the first few times
struct UnreliableApi {
    attempts: Arc<AtomicU32>,
    fail_count: u32,
}

impl UnreliableApi {
    fn new(fail_count: u32) -> Self {
        Self {
            attempts: Arc::new(AtomicU32::new(0)),
            fail_count,
        }
    }

    async fn call(&self) -> Result<String, std::io::Error> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);

        if attempt < self.fail_count {
            println!("  Attempt {}: FAILED (simulating transient error)", attempt + 1);
            Err(std::io::Error::other(format!(
                "Transient error on attempt {}",
                attempt + 1
            )))
        } else {
            println!("  Attempt {}: SUCCESS", attempt + 1);
            Ok("API response data".to_string())
        }
    }
}

/// Call `api` until it succeeds or `policy` runs out.
async fn call_with_policy(
    api: &UnreliableApi,
    mut policy: Policy,
    clock: &MonotonicClock,
) -> Result<String, Box<dyn Error>> {
    loop {
        let err = match api.call().await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };

        match policy.advance(clock)? {
            Step::Wait(wait, next) => {
                println!("  Waiting {:?} before retry...", wait);
                tokio::time::sleep(wait).await;
                policy = next;
            }
            Step::Exhausted => {
                println!("  Policy exhausted, giving up");
                return Err(err.into());
            }
        }
    }
}

/// Example 1: Exponential backoff built in code
async fn example_exponential() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 1: Exponential Backoff ===\n");

    let clock = MonotonicClock::new();
    let policy = Policy::exponential(
        RetryLimit::Count(3),
        2.0,
        Duration::from_millis(50),
        Some(Duration::from_millis(150)),
    )?;

    let api = UnreliableApi::new(2);
    let start = Instant::now();
    let response = call_with_policy(&api, policy, &clock).await?;

    println!("\nResult: {response} after {:?}", start.elapsed());
    Ok(())
}

/// Example 2: Configuration with a wall-clock budget
async fn example_time_capped() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 2: Time-Capped Linear Policy ===\n");

    let config: PolicyConfig = r#"{
        "linear": { "retries": "infinity", "timeout": 100 },
        "timecap": 350
    }"#
    .parse()?;

    let clock = MonotonicClock::new();
    let policy = Policy::from_config(&config, &clock)?;

    // Never succeeds: the budget decides when to stop.
    let api = UnreliableApi::new(u32::MAX);
    let start = Instant::now();
    let result = call_with_policy(&api, policy, &clock).await;

    println!(
        "\nGave up after {:?} ({} attempts): {}",
        start.elapsed(),
        api.attempts.load(Ordering::SeqCst),
        result.is_err()
    );
    Ok(())
}

/// Example 3: Inspecting a schedule without running it
fn example_schedule() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 3: Listing a Schedule ===\n");

    let policy = Policy::sequence([
        Policy::intervals([Duration::from_millis(10), Duration::from_millis(50)])?,
        Policy::exponential(
            RetryLimit::TotalTimeout(Duration::from_secs(5)),
            2.0,
            Duration::from_millis(200),
            Some(Duration::from_secs(1)),
        )?,
    ])?;

    for (attempt, wait) in policy.all_waits()?.iter().enumerate() {
        println!("  Retry {}: wait {:?}", attempt + 1, wait);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    example_exponential().await?;
    example_time_capped().await?;
    example_schedule()?;
    Ok(())
}
