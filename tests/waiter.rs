// ABOUTME: Timing tests for the bounded-retry waiter.
// ABOUTME: Uses paused tokio time to check attempt counts and that no sleep follows the last attempt.

use hal_agent::waiter::{Attempt, Poll, WaitError, Waiter};
use proptest::prelude::*;
use std::time::Duration;
use tokio::time::Instant;

const INTERVAL: Duration = Duration::from_secs(10);

#[tokio::test(start_paused = true)]
async fn done_on_third_call_stops_after_three_calls() {
    let waiter = Waiter::new(INTERVAL, 5);
    let started = Instant::now();
    let mut seen = Vec::new();

    let result = waiter
        .wait(|attempt: Attempt| {
            seen.push(attempt.number);
            let done = attempt.number == 3;
            async move {
                Ok::<_, std::convert::Infallible>(if done { Poll::Done } else { Poll::Continue })
            }
        })
        .await;

    assert!(result.is_ok());
    assert_eq!(seen, vec![1, 2, 3]);
    // Two sleeps between three attempts, none after the one that finished.
    assert_eq!(started.elapsed(), INTERVAL * 2);
}

#[tokio::test(start_paused = true)]
async fn first_attempt_runs_without_sleeping() {
    let waiter = Waiter::new(INTERVAL, 5);
    let started = Instant::now();

    let result = waiter
        .wait(|_| async { Ok::<_, std::convert::Infallible>(Poll::Done) })
        .await;

    assert!(result.is_ok());
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn never_done_times_out_after_exactly_max_attempts() {
    let waiter = Waiter::new(INTERVAL, 4);
    let started = Instant::now();
    let mut calls = 0;

    let result = waiter
        .wait(|attempt: Attempt| {
            calls += 1;
            let last = attempt.is_last();
            async move {
                assert_eq!(last, attempt.number == 4);
                Ok::<_, std::convert::Infallible>(Poll::Continue)
            }
        })
        .await;

    assert!(matches!(result, Err(WaitError::Timeout { attempts: 4 })));
    assert_eq!(calls, 4);
    assert_eq!(started.elapsed(), waiter.budget());
}

#[tokio::test(start_paused = true)]
async fn done_on_final_attempt_is_success() {
    let waiter = Waiter::new(INTERVAL, 3);
    let result = waiter
        .wait(|attempt: Attempt| async move {
            Ok::<_, std::convert::Infallible>(if attempt.is_last() {
                Poll::Done
            } else {
                Poll::Continue
            })
        })
        .await;
    assert!(result.is_ok());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn calls_match_done_attempt(max in 1u32..12, done_at in 1u32..16) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let (calls, finished) = runtime.block_on(async {
            let waiter = Waiter::new(Duration::from_secs(1), max);
            let mut calls = 0u32;
            let result = waiter
                .wait(|attempt: Attempt| {
                    calls += 1;
                    async move {
                        Ok::<_, std::convert::Infallible>(if attempt.number == done_at {
                            Poll::Done
                        } else {
                            Poll::Continue
                        })
                    }
                })
                .await;
            (calls, result.is_ok())
        });

        if done_at <= max {
            prop_assert!(finished);
            prop_assert_eq!(calls, done_at);
        } else {
            prop_assert!(!finished);
            prop_assert_eq!(calls, max);
        }
    }
}
