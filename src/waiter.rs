// ABOUTME: Bounded polling primitive for eventually consistent remote state.
// ABOUTME: Invokes a predicate on a fixed interval until it reports done or attempts run out.

use std::future::Future;
use std::time::Duration;

/// Signal returned by a wait predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// Remote state converged; stop waiting.
    Done,
    /// Not there yet; sleep and try again.
    Continue,
}

/// The attempt currently being made, passed by value into every predicate call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based attempt number.
    pub number: u32,
    /// Total attempts this wait is allowed.
    pub max: u32,
}

impl Attempt {
    pub fn is_last(&self) -> bool {
        self.number >= self.max
    }
}

/// Throttle for progress messages emitted from inside a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    log_every: u32,
}

impl Progress {
    pub fn every(log_every: u32) -> Self {
        Self { log_every }
    }

    /// Whether this attempt should produce a progress line.
    ///
    /// A throttle of zero never reports.
    pub fn should_report(&self, attempt: Attempt) -> bool {
        self.log_every > 0 && attempt.number % self.log_every == 0
    }
}

/// Errors from a wait.
#[derive(Debug, thiserror::Error)]
pub enum WaitError<E> {
    /// The predicate never reported done.
    #[error("timed out after {attempts} attempts")]
    Timeout { attempts: u32 },

    /// The predicate failed; waiting stopped immediately.
    #[error("{0}")]
    Predicate(E),
}

impl<E> WaitError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }
}

/// Bounded-retry poller.
///
/// Attempt 1 runs immediately. Between attempts the waiter sleeps for
/// `interval`; it never sleeps after the final attempt. `max_attempts` is
/// inclusive, and zero fails with a timeout without calling the predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waiter {
    interval: Duration,
    max_attempts: u32,
}

impl Waiter {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Upper bound on how long a wait can block.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }

    /// Poll `predicate` until it returns [`Poll::Done`].
    pub async fn wait<F, Fut, E>(&self, mut predicate: F) -> Result<(), WaitError<E>>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<Poll, E>>,
    {
        for number in 1..=self.max_attempts {
            let attempt = Attempt {
                number,
                max: self.max_attempts,
            };

            match predicate(attempt).await.map_err(WaitError::Predicate)? {
                Poll::Done => return Ok(()),
                Poll::Continue => {
                    tracing::debug!(attempt = number, max = self.max_attempts, "still waiting");
                }
            }

            if !attempt.is_last() {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(WaitError::Timeout {
            attempts: self.max_attempts,
        })
    }
}
