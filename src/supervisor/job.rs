//! Job abstraction run by the supervisor

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use std::time::Duration;

use crate::common::errors::Result;

/// When a job's `tick` runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Tick, then sleep `period`, forever
    Poll { period: Duration },
    /// Every `period`, on the top of an hour
    Aligned { period: Duration, run_on_start: bool },
    /// Tick back to back; the job blocks inside `tick` itself
    Continuous,
}

impl Schedule {
    pub fn poll_secs(secs: u64) -> Self {
        Schedule::Poll {
            period: Duration::from_secs(secs),
        }
    }

    /// Whether the first tick runs right after startup
    pub fn runs_immediately(&self) -> bool {
        match self {
            Schedule::Poll { .. } | Schedule::Continuous => true,
            Schedule::Aligned { run_on_start, .. } => *run_on_start,
        }
    }

    /// Wait before the next tick when the previous one ended at `now`
    pub fn next_wait(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Schedule::Poll { period } => *period,
            Schedule::Continuous => Duration::ZERO,
            Schedule::Aligned { period, .. } => {
                let next = next_aligned(now, *period);
                (next - now).to_std().unwrap_or(Duration::ZERO)
            }
        }
    }
}

/// First top-of-hour instant at or before `now + period`, but after `now`
pub fn next_aligned(now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let hour = ChronoDuration::hours(1);
    let period = ChronoDuration::from_std(period).unwrap_or(hour);
    let target = now + period;
    let aligned = target.duration_trunc(hour).unwrap_or(target);
    if aligned > now {
        aligned
    } else {
        now.duration_trunc(hour).unwrap_or(now) + hour
    }
}

/// A supervised pipeline
///
/// `startup` validates configuration and prepares state; failing there is
/// reported as a startup failure. `tick` runs once per schedule slot; errors
/// from it are logged and the job keeps its schedule.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    fn schedule(&self) -> Schedule;

    async fn startup(&self) -> Result<()>;

    async fn tick(&self) -> Result<()>;
}
