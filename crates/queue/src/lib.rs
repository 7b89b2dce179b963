//! Job orchestration for roversign-rs.
//!
//! - **Job state**: file-backed single-slot record of the running job
//! - **Orchestrator**: job lifecycle, restart recovery, record cleanup
//! - **Broadcast**: paced per-recipient delivery of result batches
//! - **Scheduler**: daily cron runs and the startup one-shot

pub mod broadcast;
pub mod job_state;
pub mod notifier;
pub mod orchestrator;
pub mod pacing;
pub mod scheduler;

pub use broadcast::{BroadcastBatch, BroadcastDispatcher, BroadcastEntry, BroadcastReport};
pub use job_state::{JobBusy, JobKind, JobState, JobStateStore, StateReadError};
pub use notifier::{ResultNotifier, SIGN_RESULT_TASK, SubscriptionNotifier};
pub use orchestrator::{Orchestrator, ProgressReporter, RunError, SignOutcome, SignRunner};
pub use pacing::{Pacer, PacingConfig};
pub use scheduler::{
    JobExecutor, Registration, SchedulePlan, ScheduledJob, SchedulerTask, Trigger, run_scheduler,
};
