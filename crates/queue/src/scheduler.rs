//! Scheduled jobs: daily sign-in runs, startup recovery and record cleanup.

#![allow(missing_docs)]

use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use cron::Schedule;
use futures::FutureExt;
use rover_common::{AppError, AppResult, ScheduleConfig, TimingConfig};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Hour offsets of the extra daily runs.
pub const REPEAT_OFFSETS: [u32; 4] = [9, 12, 13, 14];

/// Scheduled job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledJob {
    /// Scheduler-triggered sign-in run.
    AutoSign,
    /// Pick up a job interrupted by a restart.
    ResumeOnStartup,
    /// Delete old per-day sign records.
    ClearSignRecords,
}

/// When a registration fires.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Recurring, in local time.
    Cron(Box<Schedule>),
    /// Once, this long after the scheduler starts.
    Once(Duration),
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub id: String,
    pub job: ScheduledJob,
    pub trigger: Trigger,
}

/// Every registration the process needs.
#[derive(Debug, Clone)]
pub struct SchedulePlan {
    pub registrations: Vec<Registration>,
}

impl SchedulePlan {
    /// Build the plan from configuration.
    pub fn from_config(schedule: &ScheduleConfig, timing: &TimingConfig) -> AppResult<Self> {
        let mut registrations = vec![Registration {
            id: "rs0".to_string(),
            job: ScheduledJob::AutoSign,
            trigger: daily(schedule.sign_hour, schedule.sign_minute)?,
        }];

        if schedule.repeat_sign {
            for (i, offset) in REPEAT_OFFSETS.iter().enumerate() {
                registrations.push(Registration {
                    id: format!("rs{}", i + 1),
                    job: ScheduledJob::AutoSign,
                    trigger: daily((schedule.sign_hour + offset) % 24, schedule.sign_minute)?,
                });
            }
            tracing::info!("Repeat sign-in enabled, 5 automatic runs per day");
        } else {
            tracing::info!("Repeat sign-in disabled, 1 automatic run per day");
        }

        registrations.push(Registration {
            id: "resume_on_startup".to_string(),
            job: ScheduledJob::ResumeOnStartup,
            trigger: Trigger::Once(timing.startup_recovery_delay()),
        });
        registrations.push(Registration {
            id: "clear_sign_records".to_string(),
            job: ScheduledJob::ClearSignRecords,
            trigger: daily(schedule.cleanup_hour, schedule.cleanup_minute)?,
        });

        Ok(Self { registrations })
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.registrations.iter().map(|r| r.id.as_str()).collect()
    }
}

fn daily(hour: u32, minute: u32) -> AppResult<Trigger> {
    if hour > 23 || minute > 59 {
        return Err(AppError::Config(format!(
            "invalid schedule time {hour:02}:{minute:02}"
        )));
    }
    let expr = format!("0 {minute} {hour} * * *");
    let schedule = Schedule::from_str(&expr)
        .map_err(|e| AppError::Config(format!("invalid cron expression {expr:?}: {e}")))?;
    Ok(Trigger::Cron(Box::new(schedule)))
}

/// Job executor trait for scheduled jobs.
#[async_trait::async_trait]
pub trait JobExecutor: Send + Sync {
    /// Run the automatic sign-in job.
    async fn auto_sign(&self) -> AppResult<()>;

    /// Recover an interrupted job, if any.
    async fn resume_on_startup(&self) -> AppResult<()>;

    /// Delete old sign records. Returns the number of rows removed.
    async fn clear_sign_records(&self) -> AppResult<u64>;
}

/// Spawn one task per registration.
///
/// A job still running when the scheduler is shut down is dropped at its
/// next await point. Its job-state record stays behind for recovery.
pub fn run_scheduler<E: JobExecutor + 'static>(
    plan: SchedulePlan,
    executor: Arc<E>,
) -> SchedulerTask {
    let token = CancellationToken::new();
    let handles = plan
        .registrations
        .into_iter()
        .map(|registration| {
            let executor = executor.clone();
            let token = token.clone();
            tokio::spawn(async move { drive(registration, executor.as_ref(), token).await })
        })
        .collect();

    SchedulerTask { token, handles }
}

/// Handle to the running scheduler tasks.
pub struct SchedulerTask {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl SchedulerTask {
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Cancel every task and wait up to `grace` for them to exit.
    ///
    /// Tasks still running past the grace are aborted. Returns how many
    /// had to be aborted.
    pub async fn shutdown(self, grace: Duration) -> usize {
        self.token.cancel();
        let deadline = tokio::time::Instant::now() + grace;
        let mut aborted = 0;

        for mut handle in self.handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Scheduled task ended abnormally"),
                Err(_) => {
                    handle.abort();
                    aborted += 1;
                }
            }
        }

        if aborted > 0 {
            tracing::warn!(aborted, grace = ?grace, "Scheduled tasks did not stop in time, aborted");
        }
        aborted
    }
}

async fn drive<E: JobExecutor>(registration: Registration, executor: &E, token: CancellationToken) {
    let Registration { id, job, trigger } = registration;
    match trigger {
        Trigger::Once(delay) => {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    execute_until_cancelled(&id, job, executor, &token).await;
                }
            }
        }
        Trigger::Cron(schedule) => loop {
            let Some(next) = schedule.upcoming(Local).next() else {
                tracing::warn!(id = %id, "Schedule has no upcoming run");
                break;
            };
            let wait = (next - Local::now()).to_std().unwrap_or_default();
            tracing::debug!(id = %id, next = %next, "Next scheduled run");

            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(wait) => {
                    if !execute_until_cancelled(&id, job, executor, &token).await {
                        break;
                    }
                }
            }
        },
    }
    tracing::debug!(id = %id, "Scheduled task stopped");
}

/// Returns `false` if the job was dropped by cancellation.
async fn execute_until_cancelled<E: JobExecutor>(
    id: &str,
    job: ScheduledJob,
    executor: &E,
    token: &CancellationToken,
) -> bool {
    tokio::select! {
        () = token.cancelled() => {
            tracing::warn!(id, job = ?job, "Scheduled job interrupted by shutdown");
            false
        }
        () = execute(id, job, executor) => true,
    }
}

async fn execute<E: JobExecutor>(id: &str, job: ScheduledJob, executor: &E) {
    tracing::info!(id, job = ?job, "Running scheduled job");
    let run = async {
        match job {
            ScheduledJob::AutoSign => executor.auto_sign().await,
            ScheduledJob::ResumeOnStartup => executor.resume_on_startup().await,
            ScheduledJob::ClearSignRecords => executor.clear_sign_records().await.map(|count| {
                tracing::info!(count, "Cleared old sign records");
            }),
        }
    };

    match AssertUnwindSafe(run).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(id, error = %e, "Scheduled job failed"),
        Err(_) => tracing::error!(id, "Scheduled job panicked"),
    }
}
