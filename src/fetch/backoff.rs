//! Randomized linear backoff
//!
//! The Armory throttles aggressive clients, so transient failures back off
//! before retrying. The delay grows linearly, not exponentially: after each
//! sleep the next delay increases by `increment * U(1.0, 1.5)`. The jitter
//! keeps a fleet of workers from retrying in lockstep.

use rand::Rng;
use std::time::Duration;

/// Retry budget and delay parameters for transient fetch failures.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// How many retries (and therefore sleeps) a fetch may consume.
    pub attempts: u32,

    /// Delay before the first retry.
    pub initial: Duration,

    /// Base growth added to the delay after every retry, scaled by
    /// `U(1.0, 1.5)`.
    pub increment: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial: Duration::from_secs(30),
            increment: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// Starts a fresh schedule for one logical fetch.
    pub fn schedule(&self) -> BackoffSchedule {
        BackoffSchedule {
            remaining: self.attempts,
            delay: self.initial,
            increment: self.increment,
        }
    }
}

/// The per-fetch state of a backoff policy.
///
/// Each call to [`next_delay`](BackoffSchedule::next_delay) consumes one
/// attempt and returns the duration to sleep before the retry, or `None`
/// once the budget is spent.
#[derive(Debug)]
pub struct BackoffSchedule {
    remaining: u32,
    delay: Duration,
    increment: Duration,
}

impl BackoffSchedule {
    /// Consumes one attempt using the thread-local RNG.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.next_delay_with(&mut rand::thread_rng())
    }

    /// Consumes one attempt, sourcing jitter from `rng`.
    pub fn next_delay_with<R: Rng>(&mut self, rng: &mut R) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let current = self.delay;
        self.delay += self.increment.mul_f64(rng.gen_range(1.0..1.5));
        Some(current)
    }

    /// Attempts left in the budget.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}
