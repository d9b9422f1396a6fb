//! Drives a single job through startup and its tick schedule

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::job::Job;
use crate::common::channels::{is_shutdown, ShutdownReceiver};
use crate::common::errors::MonitorError;

/// How a job task ended
#[derive(Debug)]
pub enum JobExit {
    /// Shutdown was requested
    Shutdown,
    /// `startup` failed; the job never ticked
    StartupFailed(MonitorError),
}

/// Sleep for `duration` unless shutdown is requested first
///
/// Returns `true` when shutdown was requested.
pub async fn sleep_or_shutdown(duration: Duration, shutdown: &mut ShutdownReceiver) -> bool {
    if is_shutdown(shutdown) {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => is_shutdown(shutdown),
        changed = shutdown.changed() => changed.is_err() || is_shutdown(shutdown),
    }
}

/// Run `job` until shutdown or a startup failure
///
/// `initial_delay` is applied before startup (used for restarts). `started`
/// flips to `true` once startup succeeds.
pub async fn run_job(
    job: Arc<dyn Job>,
    mut shutdown: ShutdownReceiver,
    initial_delay: Duration,
    started: Arc<AtomicBool>,
) -> JobExit {
    let name = job.name().to_string();

    if !initial_delay.is_zero() && sleep_or_shutdown(initial_delay, &mut shutdown).await {
        return JobExit::Shutdown;
    }

    info!(job = %name, "Starting job");
    if let Err(err) = job.startup().await {
        return JobExit::StartupFailed(err);
    }
    started.store(true, Ordering::SeqCst);

    let schedule = job.schedule();
    if !schedule.runs_immediately() {
        let wait = schedule.next_wait(Utc::now());
        debug!(job = %name, wait_secs = wait.as_secs(), "Waiting for first slot");
        if sleep_or_shutdown(wait, &mut shutdown).await {
            return JobExit::Shutdown;
        }
    }

    loop {
        if is_shutdown(&shutdown) {
            return JobExit::Shutdown;
        }

        // a tick always runs to completion; shutdown is observed between ticks
        if let Err(err) = job.tick().await {
            warn!(job = %name, error = %err, "Job tick failed");
        }

        let wait = schedule.next_wait(Utc::now());
        if sleep_or_shutdown(wait, &mut shutdown).await {
            return JobExit::Shutdown;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::channels::create_shutdown;
    use crate::common::errors::Result;
    use crate::supervisor::job::Schedule;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct CountingJob {
        ticks: AtomicU32,
        fail_startup: bool,
    }

    #[async_trait]
    impl Job for CountingJob {
        fn name(&self) -> &str {
            "counting"
        }

        fn schedule(&self) -> Schedule {
            Schedule::Poll {
                period: Duration::from_millis(5),
            }
        }

        async fn startup(&self) -> Result<()> {
            if self.fail_startup {
                return Err(MonitorError::Configuration("missing webhook".to_string()));
            }
            Ok(())
        }

        async fn tick(&self) -> Result<()> {
            let n = self.ticks.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 0 {
                return Err(MonitorError::Internal("flaky".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_ticks_survive_errors_until_shutdown() {
        let job = Arc::new(CountingJob {
            ticks: AtomicU32::new(0),
            fail_startup: false,
        });
        let (tx, rx) = create_shutdown();
        let started = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run_job(job.clone(), rx, Duration::ZERO, started.clone()));

        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(true).unwrap();
        let exit = handle.await.unwrap();

        assert!(matches!(exit, JobExit::Shutdown));
        assert!(started.load(Ordering::SeqCst));
        assert!(job.ticks.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_startup_failure_is_reported() {
        let job = Arc::new(CountingJob {
            ticks: AtomicU32::new(0),
            fail_startup: true,
        });
        let (_tx, rx) = create_shutdown();
        let started = Arc::new(AtomicBool::new(false));

        let exit = run_job(job.clone(), rx, Duration::ZERO, started.clone()).await;

        match exit {
            JobExit::StartupFailed(err) => assert!(err.is_configuration()),
            other => panic!("unexpected exit {:?}", other),
        }
        assert!(!started.load(Ordering::SeqCst));
        assert_eq!(job.ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_during_initial_delay() {
        let job = Arc::new(CountingJob {
            ticks: AtomicU32::new(0),
            fail_startup: false,
        });
        let (tx, rx) = create_shutdown();
        tx.send(true).unwrap();

        let exit = run_job(job, rx, Duration::from_secs(60), Arc::new(AtomicBool::new(false))).await;
        assert!(matches!(exit, JobExit::Shutdown));
    }

    struct SlowJob {
        begun: AtomicU32,
        finished: AtomicU32,
    }

    #[async_trait]
    impl Job for SlowJob {
        fn name(&self) -> &str {
            "slow"
        }

        fn schedule(&self) -> Schedule {
            Schedule::Poll {
                period: Duration::from_millis(5),
            }
        }

        async fn startup(&self) -> Result<()> {
            Ok(())
        }

        async fn tick(&self) -> Result<()> {
            self.begun.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_lets_running_tick_finish() {
        let job = Arc::new(SlowJob {
            begun: AtomicU32::new(0),
            finished: AtomicU32::new(0),
        });
        let (tx, rx) = create_shutdown();
        let handle = tokio::spawn(run_job(
            job.clone(),
            rx,
            Duration::ZERO,
            Arc::new(AtomicBool::new(false)),
        ));

        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();
        let exit = handle.await.unwrap();

        assert!(matches!(exit, JobExit::Shutdown));
        assert_eq!(job.begun.load(Ordering::SeqCst), 1);
        assert_eq!(job.finished.load(Ordering::SeqCst), 1);
    }
}
