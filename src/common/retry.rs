//! Shared retry policy for remote calls
//!
//! Both the dispatch client and the balance oracle use the same schedule:
//! start at one unit, double per attempt, cap at sixty units, give up after
//! five attempts.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default number of attempts before a call is dropped
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Added on top of a server-advised rate-limit wait
pub const DEFAULT_RATE_LIMIT_BUFFER: Duration = Duration::from_millis(100);

/// Exponential backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Upper bound for any computed delay
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
        }
    }

    /// Delay to apply after the given zero-based failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn has_attempts_left(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Suspension point used for backoff waits
///
/// Production code sleeps on the tokio timer; tests swap in a recorder.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by `tokio::time::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that records requested waits and returns immediately
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    waits: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// All waits requested so far, in order
    pub fn waits(&self) -> Vec<Duration> {
        match self.waits.lock() {
            Ok(waits) => waits.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        match self.waits.lock() {
            Ok(mut waits) => waits.push(duration),
            Err(poisoned) => poisoned.into_inner().push(duration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_schedule_doubles() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (0..5).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn test_schedule_is_capped() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(6), Duration::from_secs(60));
        assert_eq!(policy.delay_for(40), Duration::from_secs(60));
    }

    #[test]
    fn test_attempt_budget() {
        let policy = BackoffPolicy::default();
        assert!(policy.has_attempts_left(4));
        assert!(!policy.has_attempts_left(5));

        let single = BackoffPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1));
        assert_eq!(single.max_attempts, 1);
    }

    #[tokio::test]
    async fn test_recording_sleeper_keeps_order() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_secs(2)).await;
        sleeper.sleep(Duration::from_secs(1)).await;
        assert_eq!(
            sleeper.waits(),
            vec![Duration::from_secs(2), Duration::from_secs(1)]
        );
    }
}
