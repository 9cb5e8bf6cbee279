//! Policy schedule tests
//!
//! Concrete schedules for every policy kind, driven through the public API:
//! - Linear, exponential and interval waits
//! - Sequences handing over between sub-policies
//! - Retry counts derived from a total timeout
//! - Reuse of a starting policy across independent retry loops

use retryplan::{ManualClock, Policy, PolicyError, RetryLimit, Retries, Step};
use rstest::*;
use std::time::Duration;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn waits_ms(policy: &Policy) -> Vec<u64> {
    policy
        .all_waits()
        .unwrap()
        .into_iter()
        .map(|wait| wait.as_millis() as u64)
        .collect()
}

#[rstest]
#[case::linear(Policy::linear(RetryLimit::Count(3), ms(100)).unwrap(), vec![100, 100, 100])]
#[case::exponential_capped(
    Policy::exponential(RetryLimit::Count(4), 2.0, ms(100), Some(ms(500))).unwrap(),
    vec![100, 200, 400, 500]
)]
#[case::exponential_uncapped(
    Policy::exponential(RetryLimit::Count(5), 3.0, ms(10), None).unwrap(),
    vec![10, 30, 90, 270, 810]
)]
#[case::intervals(Policy::intervals([ms(50), ms(200), ms(1000)]).unwrap(), vec![50, 200, 1000])]
#[case::sequence(
    Policy::sequence([
        Policy::linear(RetryLimit::Count(2), ms(10)).unwrap(),
        Policy::exponential(RetryLimit::Count(3), 2.0, ms(100), None).unwrap(),
    ])
    .unwrap(),
    vec![10, 10, 100, 200, 400]
)]
fn test_schedule(#[case] policy: Policy, #[case] expected: Vec<u64>) {
    assert_eq!(waits_ms(&policy), expected);
}

#[rstest]
#[case::linear(Policy::linear(RetryLimit::Count(3), ms(100)).unwrap(), 3)]
#[case::intervals(Policy::intervals([ms(50), ms(200), ms(1000)]).unwrap(), 3)]
fn test_advance_after_last_wait_is_exhausted(#[case] policy: Policy, #[case] waits: usize) {
    let clock = ManualClock::new(0);
    let mut state = policy;

    for _ in 0..waits {
        match state.advance(&clock).unwrap() {
            Step::Wait(_, next) => state = next,
            Step::Exhausted => panic!("exhausted too early"),
        }
    }

    assert_eq!(state.advance(&clock).unwrap(), Step::Exhausted);
    // Idempotent
    assert_eq!(state.advance(&clock).unwrap(), Step::Exhausted);
}

#[test]
fn test_nested_sequences() {
    let inner = Policy::sequence([
        Policy::intervals([ms(1), ms(2)]).unwrap(),
        Policy::linear(RetryLimit::Count(1), ms(3)).unwrap(),
    ])
    .unwrap();
    let outer = Policy::sequence([inner, Policy::intervals([ms(4)]).unwrap()]).unwrap();

    assert_eq!(waits_ms(&outer), vec![1, 2, 3, 4]);
}

#[test]
fn test_sequence_replaces_head_in_place() {
    let clock = ManualClock::new(0);
    let tail = Policy::intervals([ms(99)]).unwrap();
    let policy = Policy::sequence([
        Policy::linear(RetryLimit::Count(2), ms(10)).unwrap(),
        tail.clone(),
    ])
    .unwrap();

    let step = policy.advance(&clock).unwrap();
    assert_eq!(
        step,
        Step::Wait(
            ms(10),
            Policy::Sequence {
                policies: vec![
                    Policy::Linear {
                        retries: Retries::Limited(1),
                        timeout: ms(10),
                    },
                    tail,
                ],
            }
        )
    );
}

#[rstest]
#[case(1000, 300, 3)]
#[case(900, 300, 3)]
#[case(299, 300, 0)]
#[case(60_000, 1000, 60)]
fn test_linear_total_timeout(#[case] budget: u64, #[case] timeout: u64, #[case] retries: usize) {
    let policy = Policy::linear(RetryLimit::TotalTimeout(ms(budget)), ms(timeout)).unwrap();

    if retries == 0 {
        assert!(policy.is_exhausted());
    }
    assert_eq!(waits_ms(&policy).len(), retries);
}

#[test]
fn test_exponential_total_timeout_fits_budget() {
    let budget = 3000;
    let policy = Policy::exponential(
        RetryLimit::TotalTimeout(ms(budget)),
        2.0,
        ms(100),
        Some(ms(500)),
    )
    .unwrap();

    let waits = waits_ms(&policy);
    assert_eq!(waits, vec![100, 200, 400, 500, 500, 500, 500]);
    assert!(waits.iter().sum::<u64>() <= budget);
}

#[test]
fn test_construction_errors() {
    let cases = [
        Policy::linear(RetryLimit::Count(0), ms(100)),
        Policy::linear(RetryLimit::TotalTimeout(ms(1000)), Duration::ZERO),
        Policy::exponential(RetryLimit::Count(3), 0.0, ms(100), None),
        Policy::intervals(Vec::new()),
        Policy::intervals([ms(5), Duration::ZERO]),
        Policy::sequence(Vec::new()),
    ];

    for result in cases {
        assert!(matches!(result, Err(PolicyError::InvalidPolicy(_))));
    }
}

#[test]
fn test_starting_policy_seeds_independent_loops() {
    let policy = Policy::exponential(RetryLimit::Count(3), 2.0, ms(100), None).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let policy = policy.clone();
            std::thread::spawn(move || waits_ms(&policy))
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), vec![100, 200, 400]);
    }
    assert_eq!(waits_ms(&policy), vec![100, 200, 400]);
}

#[test]
fn test_shared_reference_across_threads() {
    let policy = Policy::intervals([ms(5), ms(10)]).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| assert_eq!(waits_ms(&policy), vec![5, 10]));
        }
    });
}
