//! Job scheduling and supervision

pub mod job;
pub mod scheduler;
pub mod watchdog;

pub use job::{Job, Schedule};
pub use scheduler::{run_job, sleep_or_shutdown, JobExit};
pub use watchdog::{
    FailureKind, FailureReason, JobState, JobStatus, StatusBoard, Supervisor, SupervisorSettings,
};
