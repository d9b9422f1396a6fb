//! Supervisor keeping every job alive
//!
//! A fixed-interval health check inspects each job task. Finished tasks are
//! classified (startup failure, panic, unexpected exit) and relaunched after a
//! delay that doubles with consecutive failures. Repeated startup failures are
//! reported as a configuration problem rather than a transient one.

use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

use super::job::Job;
use super::scheduler::{run_job, sleep_or_shutdown, JobExit};
use crate::common::channels::{is_shutdown, ShutdownReceiver};
use crate::config::types::SupervisorConfig;

/// Supervisor timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub health_check_interval: Duration,
    pub restart_delay: Duration,
    pub max_restart_delay: Duration,
    pub crash_loop_threshold: u32,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from(&SupervisorConfig::default())
    }
}

impl From<&SupervisorConfig> for SupervisorSettings {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            health_check_interval: Duration::from_secs(config.health_check_interval_seconds),
            restart_delay: Duration::from_secs(config.restart_delay_seconds),
            max_restart_delay: Duration::from_secs(config.max_restart_delay_seconds),
            crash_loop_threshold: config.crash_loop_threshold.max(1),
        }
    }
}

impl SupervisorSettings {
    /// Restart delay after `failures` consecutive failures (1-based)
    pub fn restart_delay_for(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(31);
        self.restart_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_restart_delay)
            .min(self.max_restart_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Startup (configuration validation) failed
    Startup,
    /// Task ended without a shutdown request
    Runtime,
    /// Task panicked
    Panic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    Failed(FailureReason),
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Idle => write!(f, "idle"),
            JobState::Running => write!(f, "running"),
            JobState::Failed(reason) => write!(f, "failed ({:?}): {}", reason.kind, reason.message),
        }
    }
}

/// Point-in-time view of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub name: String,
    pub state: JobState,
    pub restarts: u32,
    pub consecutive_failures: u32,
    pub consecutive_startup_failures: u32,
    /// Startup kept failing; most likely missing or invalid configuration
    pub crash_loop: bool,
    pub last_failure: Option<FailureReason>,
}

impl JobStatus {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: JobState::Idle,
            restarts: 0,
            consecutive_failures: 0,
            consecutive_startup_failures: 0,
            crash_loop: false,
            last_failure: None,
        }
    }
}

/// Shared, queryable job statuses
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<Vec<JobStatus>>>,
}

impl StatusBoard {
    pub fn snapshot(&self) -> Vec<JobStatus> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn get(&self, name: &str) -> Option<JobStatus> {
        self.snapshot().into_iter().find(|s| s.name == name)
    }

    fn publish(&self, statuses: Vec<JobStatus>) {
        match self.inner.write() {
            Ok(mut guard) => *guard = statuses,
            Err(poisoned) => *poisoned.into_inner() = statuses,
        }
    }
}

struct Slot {
    job: Arc<dyn Job>,
    handle: Option<JoinHandle<JobExit>>,
    started: Arc<AtomicBool>,
    status: JobStatus,
}

pub struct Supervisor {
    settings: SupervisorSettings,
    slots: Vec<Slot>,
    board: StatusBoard,
}

impl Supervisor {
    pub fn new(settings: SupervisorSettings) -> Self {
        Self {
            settings,
            slots: Vec::new(),
            board: StatusBoard::default(),
        }
    }

    /// Register a job; it is launched when [`Supervisor::run`] starts
    ///
    /// # Arguments
    /// * `job` - Job to keep alive; its `name` keys the status board
    pub fn add_job(&mut self, job: Arc<dyn Job>) {
        let status = JobStatus::new(job.name());
        self.slots.push(Slot {
            job,
            handle: None,
            started: Arc::new(AtomicBool::new(false)),
            status,
        });
    }

    pub fn job_count(&self) -> usize {
        self.slots.len()
    }

    /// Handle for querying job statuses while the supervisor runs
    pub fn status_board(&self) -> StatusBoard {
        self.board.clone()
    }

    /// Run every job until shutdown is requested
    ///
    /// Each health check that panics is logged and counted; the loop
    /// itself only ends when `shutdown` fires, after which every job task
    /// is awaited.
    ///
    /// # Arguments
    /// * `shutdown` - Receiver flipped by the signal handler in `main`
    pub async fn run(mut self, mut shutdown: ShutdownReceiver) {
        info!(jobs = self.slots.len(), "Supervisor starting");
        for slot in &mut self.slots {
            spawn_slot(slot, shutdown.clone(), Duration::ZERO);
        }
        self.publish();

        let mut cycle_panics: u32 = 0;
        loop {
            if sleep_or_shutdown(self.settings.health_check_interval, &mut shutdown).await {
                break;
            }

            let cycle = AssertUnwindSafe(self.check_cycle(&shutdown)).catch_unwind().await;
            match cycle {
                Ok(()) => cycle_panics = 0,
                Err(payload) => {
                    cycle_panics = cycle_panics.saturating_add(1);
                    let delay = self.settings.restart_delay_for(cycle_panics);
                    error!(
                        panic = %panic_message(payload.as_ref()),
                        delay_secs = delay.as_secs(),
                        "Health check cycle panicked, resuming"
                    );
                    if sleep_or_shutdown(delay, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        info!("Supervisor stopping, waiting for jobs");
        for slot in &mut self.slots {
            if let Some(handle) = slot.handle.take() {
                let _ = handle.await;
            }
            slot.status.state = JobState::Idle;
        }
        self.publish();
    }

    /// Inspect every job once and relaunch finished ones
    async fn check_cycle(&mut self, shutdown: &ShutdownReceiver) {
        let settings = self.settings;
        for slot in &mut self.slots {
            let finished = slot.handle.as_ref().map_or(true, |h| h.is_finished());

            if !finished {
                if slot.started.load(Ordering::SeqCst) {
                    if slot.status.consecutive_failures > 0 {
                        info!(job = %slot.status.name, "Job recovered");
                    }
                    slot.status.state = JobState::Running;
                    slot.status.consecutive_failures = 0;
                    slot.status.consecutive_startup_failures = 0;
                    slot.status.crash_loop = false;
                }
                continue;
            }

            let exit = match slot.handle.take() {
                Some(handle) => handle.await,
                None => Ok(JobExit::Shutdown),
            };
            if is_shutdown(shutdown) {
                slot.status.state = JobState::Idle;
                continue;
            }

            let reason = classify_exit(exit);
            record_failure(&settings, &mut slot.status, reason);

            let delay = settings.restart_delay_for(slot.status.consecutive_failures);
            slot.status.restarts += 1;
            info!(
                job = %slot.job.name(),
                restart = slot.status.restarts,
                delay_ms = delay.as_millis() as u64,
                "Relaunching job"
            );
            spawn_slot(slot, shutdown.clone(), delay);
        }
        self.publish();
    }

    fn publish(&self) {
        self.board
            .publish(self.slots.iter().map(|s| s.status.clone()).collect());
    }
}

fn spawn_slot(slot: &mut Slot, shutdown: ShutdownReceiver, delay: Duration) {
    let started = Arc::new(AtomicBool::new(false));
    slot.started = started.clone();
    slot.handle = Some(tokio::spawn(run_job(
        slot.job.clone(),
        shutdown,
        delay,
        started,
    )));
}

fn classify_exit(exit: Result<JobExit, JoinError>) -> FailureReason {
    match exit {
        Ok(JobExit::StartupFailed(err)) => FailureReason {
            kind: FailureKind::Startup,
            message: err.to_string(),
        },
        Ok(JobExit::Shutdown) => FailureReason {
            kind: FailureKind::Runtime,
            message: "job stopped without a shutdown request".to_string(),
        },
        Err(err) if err.is_panic() => FailureReason {
            kind: FailureKind::Panic,
            message: panic_message(err.into_panic().as_ref()),
        },
        Err(err) => FailureReason {
            kind: FailureKind::Runtime,
            message: err.to_string(),
        },
    }
}

fn record_failure(settings: &SupervisorSettings, status: &mut JobStatus, reason: FailureReason) {
    status.consecutive_failures = status.consecutive_failures.saturating_add(1);
    if reason.kind == FailureKind::Startup {
        status.consecutive_startup_failures = status.consecutive_startup_failures.saturating_add(1);
    } else {
        status.consecutive_startup_failures = 0;
    }
    status.crash_loop = status.consecutive_startup_failures >= settings.crash_loop_threshold;

    let delay = settings.restart_delay_for(status.consecutive_failures);
    if status.crash_loop {
        error!(
            job = %status.name,
            failures = status.consecutive_startup_failures,
            error = %reason.message,
            "Job keeps failing at startup, check its configuration"
        );
    } else {
        warn!(
            job = %status.name,
            kind = ?reason.kind,
            error = %reason.message,
            restart_in_secs = delay.as_secs_f64(),
            "Job failed, restarting"
        );
    }
    status.state = JobState::Failed(reason.clone());
    status.last_failure = Some(reason);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::channels::create_shutdown;
    use crate::common::errors::{MonitorError, Result};
    use crate::supervisor::job::Schedule;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Healthy,
        BadConfig,
        PanicOnFirstTick,
    }

    struct TestJob {
        name: &'static str,
        behaviour: Behaviour,
        ticks: AtomicU32,
        startups: AtomicU32,
        name_calls: AtomicU32,
        /// `name()` panics on this call (1-based), if set
        panic_on_name_call: Option<u32>,
    }

    impl TestJob {
        fn new(name: &'static str, behaviour: Behaviour) -> Arc<Self> {
            Self::build(name, behaviour, None)
        }

        fn build(name: &'static str, behaviour: Behaviour, panic_on_name_call: Option<u32>) -> Arc<Self> {
            Arc::new(Self {
                name,
                behaviour,
                ticks: AtomicU32::new(0),
                startups: AtomicU32::new(0),
                name_calls: AtomicU32::new(0),
                panic_on_name_call,
            })
        }
    }

    #[async_trait]
    impl Job for TestJob {
        fn name(&self) -> &str {
            let call = self.name_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.panic_on_name_call == Some(call) {
                panic!("name lookup failed");
            }
            self.name
        }

        fn schedule(&self) -> Schedule {
            Schedule::Poll {
                period: Duration::from_millis(5),
            }
        }

        async fn startup(&self) -> Result<()> {
            self.startups.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::BadConfig => {
                    Err(MonitorError::Configuration("missing webhooks.empty_check".to_string()))
                }
                _ => Ok(()),
            }
        }

        async fn tick(&self) -> Result<()> {
            let n = self.ticks.fetch_add(1, Ordering::SeqCst);
            if matches!(self.behaviour, Behaviour::PanicOnFirstTick) && n == 0 {
                panic!("boom");
            }
            Ok(())
        }
    }

    fn fast_settings() -> SupervisorSettings {
        SupervisorSettings {
            health_check_interval: Duration::from_millis(10),
            restart_delay: Duration::from_millis(2),
            max_restart_delay: Duration::from_millis(8),
            crash_loop_threshold: 3,
        }
    }

    #[test]
    fn test_restart_delay_doubles_and_caps() {
        let settings = SupervisorSettings {
            restart_delay: Duration::from_secs(5),
            max_restart_delay: Duration::from_secs(300),
            ..fast_settings()
        };
        let delays: Vec<u64> = (1..=8).map(|n| settings.restart_delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 80, 160, 300, 300]);
        assert_eq!(settings.restart_delay_for(100).as_secs(), 300);
    }

    #[test]
    fn test_crash_loop_classification() {
        let settings = fast_settings();
        let mut status = JobStatus::new("balance");
        for _ in 0..2 {
            record_failure(
                &settings,
                &mut status,
                FailureReason {
                    kind: FailureKind::Startup,
                    message: "missing".to_string(),
                },
            );
        }
        assert!(!status.crash_loop);
        record_failure(
            &settings,
            &mut status,
            FailureReason {
                kind: FailureKind::Startup,
                message: "missing".to_string(),
            },
        );
        assert!(status.crash_loop);

        record_failure(
            &settings,
            &mut status,
            FailureReason {
                kind: FailureKind::Panic,
                message: "boom".to_string(),
            },
        );
        assert!(!status.crash_loop);
        assert_eq!(status.consecutive_failures, 4);
    }

    #[tokio::test]
    async fn test_supervisor_restarts_and_classifies_jobs() {
        let healthy = TestJob::new("healthy", Behaviour::Healthy);
        let broken = TestJob::new("broken", Behaviour::BadConfig);
        let flaky = TestJob::new("flaky", Behaviour::PanicOnFirstTick);

        let mut supervisor = Supervisor::new(fast_settings());
        supervisor.add_job(healthy.clone());
        supervisor.add_job(broken.clone());
        supervisor.add_job(flaky.clone());
        let board = supervisor.status_board();

        let (tx, rx) = create_shutdown();
        let handle = tokio::spawn(supervisor.run(rx));
        tokio::time::sleep(Duration::from_millis(300)).await;

        let healthy_status = board.get("healthy").unwrap();
        assert_eq!(healthy_status.state, JobState::Running);
        assert_eq!(healthy_status.restarts, 0);

        let broken_status = board.get("broken").unwrap();
        assert!(broken_status.crash_loop);
        assert!(broken_status.restarts >= 3);
        assert_eq!(
            broken_status.last_failure.map(|f| f.kind),
            Some(FailureKind::Startup)
        );

        let flaky_status = board.get("flaky").unwrap();
        assert_eq!(flaky_status.state, JobState::Running);
        assert_eq!(flaky_status.restarts, 1);
        assert_eq!(
            flaky_status.last_failure.map(|f| (f.kind, f.message)),
            Some((FailureKind::Panic, "boom".to_string()))
        );
        assert!(flaky.ticks.load(Ordering::SeqCst) > 1);

        tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(board
            .snapshot()
            .iter()
            .all(|status| status.state == JobState::Idle));
    }

    #[tokio::test]
    async fn test_panicking_health_check_keeps_supervising() {
        // call 1 is add_job, call 2 the first launch, call 3 the relaunch log
        let job = TestJob::build("broken", Behaviour::BadConfig, Some(3));

        let mut supervisor = Supervisor::new(fast_settings());
        supervisor.add_job(job.clone());
        let board = supervisor.status_board();

        let (tx, rx) = create_shutdown();
        let handle = tokio::spawn(supervisor.run(rx));
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(job.name_calls.load(Ordering::SeqCst) > 3);
        assert!(job.startups.load(Ordering::SeqCst) > 2);
        let status = board.get("broken").unwrap();
        assert!(status.restarts >= 2);
        assert!(matches!(status.state, JobState::Failed(_)));

        tx.send(true).unwrap();
        assert!(handle.await.is_ok());
        assert_eq!(board.get("broken").unwrap().state, JobState::Idle);
    }
}
