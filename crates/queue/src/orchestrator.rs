//! Sign-in job lifecycle.
//!
//! Ties one run of the external sign-in work to the job-state slot: claim the
//! slot, run, report, release. Also owns restart recovery and the daily
//! sign-record cleanup.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Days, Local};
use futures::FutureExt;
use rover_common::{AppError, AppResult, Metrics, ScheduleConfig};
use rover_db::repositories::SignRecordRepository;
use thiserror::Error;

use crate::broadcast::{BroadcastBatch, BroadcastDispatcher};
use crate::job_state::{JobBusy, JobKind, JobStateStore};
use crate::notifier::{ResultNotifier, SIGN_RESULT_TASK};
use crate::scheduler::JobExecutor;

/// What a sign-in run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignOutcome {
    /// Human-readable result.
    pub summary: String,
    /// Per-user results to push out, if any.
    pub broadcast: Option<BroadcastBatch>,
}

/// Forwards progress of the running job to the state store.
#[derive(Clone)]
pub struct ProgressReporter {
    store: Arc<JobStateStore>,
}

impl ProgressReporter {
    #[must_use]
    pub const fn new(store: Arc<JobStateStore>) -> Self {
        Self { store }
    }

    pub async fn set_total(&self, total: u64) {
        self.store.set_total(total).await;
    }

    pub async fn update_progress(&self, completed: u64) {
        self.store.update_progress(completed).await;
    }
}

/// The sign-in work itself.
#[async_trait]
pub trait SignRunner: Send + Sync {
    /// Sign in every account, skipping the first `resume_from` work items.
    async fn run(
        &self,
        kind: JobKind,
        resume_from: u64,
        progress: &ProgressReporter,
    ) -> AppResult<SignOutcome>;
}

/// Why a requested run did not produce a summary.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Busy(#[from] JobBusy),
    #[error(transparent)]
    Failed(#[from] AppError),
}

/// Runs sign-in jobs.
pub struct Orchestrator {
    store: Arc<JobStateStore>,
    runner: Arc<dyn SignRunner>,
    notifier: Arc<dyn ResultNotifier>,
    dispatcher: Arc<BroadcastDispatcher>,
    sign_records: SignRecordRepository,
    schedule: ScheduleConfig,
    metrics: Arc<Metrics>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        store: Arc<JobStateStore>,
        runner: Arc<dyn SignRunner>,
        notifier: Arc<dyn ResultNotifier>,
        dispatcher: Arc<BroadcastDispatcher>,
        sign_records: SignRecordRepository,
        schedule: ScheduleConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            runner,
            notifier,
            dispatcher,
            sign_records,
            schedule,
            metrics,
        }
    }

    /// Scheduler entry point. A run that finds the slot taken is skipped.
    pub async fn run_auto(&self) -> AppResult<()> {
        if let Err(busy) = self.store.begin(JobKind::Auto).await {
            tracing::info!(active = %busy.active, "Skipping scheduled sign-in, a job is running");
            return Ok(());
        }

        let result = self.auto_body(0).await;
        self.store.end().await;
        result
    }

    /// User command entry point. Returns the summary to reply with.
    pub async fn run_manual(&self) -> Result<String, RunError> {
        self.store.begin(JobKind::Manual).await?;

        let result = self.execute(JobKind::Manual, 0).await;
        self.store.end().await;
        Ok(result?.summary)
    }

    /// Re-drive a job interrupted by a restart.
    ///
    /// Returns the kind of job that was recovered, if any.
    pub async fn recover_on_boot(&self) -> AppResult<Option<JobKind>> {
        let Some(state) = self.store.active_state().await else {
            tracing::debug!("No interrupted job to recover");
            return Ok(None);
        };

        let resume_from = if self.schedule.resume_from_progress {
            state.completed.unwrap_or(0)
        } else {
            0
        };
        self.metrics.record_job_recovered();
        tracing::warn!(
            kind = %state.kind,
            started_at = %state.started_at,
            resume_from,
            total = ?state.total,
            "Recovering interrupted job"
        );

        // The record stays in place while the job runs again
        let result = match state.kind {
            JobKind::Auto => self.auto_body(resume_from).await,
            JobKind::Manual => self.execute(JobKind::Manual, resume_from).await.map(|outcome| {
                tracing::info!(summary = %outcome.summary, "Recovered sign-in finished");
            }),
        };
        self.store.end().await;

        result.map(|()| Some(state.kind))
    }

    /// Delete sign records dated on or before today minus the retention.
    pub async fn cleanup_sign_records(&self) -> AppResult<u64> {
        let cutoff = Local::now()
            .date_naive()
            .checked_sub_days(Days::new(u64::from(self.schedule.sign_record_retention_days)))
            .ok_or_else(|| AppError::Internal("sign record cutoff out of range".to_string()))?;
        let cutoff = cutoff.format("%Y-%m-%d").to_string();

        let removed = self.sign_records.delete_through(&cutoff).await?;
        tracing::info!(cutoff = %cutoff, removed, "Cleared old sign records");
        Ok(removed)
    }

    async fn auto_body(&self, resume_from: u64) -> AppResult<()> {
        let outcome = self.execute(JobKind::Auto, resume_from).await?;

        match self.notifier.notify(&outcome.summary).await {
            Ok(0) => {}
            Ok(reached) => tracing::info!(reached, "Pushed sign-in summary"),
            Err(e) => tracing::error!(error = %e, "Failed to push sign-in summary"),
        }

        if let Some(batch) = outcome.broadcast.filter(|b| !b.is_empty()) {
            self.dispatcher.dispatch(&batch, SIGN_RESULT_TASK).await;
        }
        Ok(())
    }

    async fn execute(&self, kind: JobKind, resume_from: u64) -> AppResult<SignOutcome> {
        tracing::info!(kind = %kind, resume_from, "Sign-in started");
        let progress = ProgressReporter::new(self.store.clone());

        let run = AssertUnwindSafe(self.runner.run(kind, resume_from, &progress))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(AppError::Internal("sign-in runner panicked".to_string())));

        match run {
            Ok(outcome) => {
                self.metrics.record_job_completed();
                tracing::info!(kind = %kind, "Sign-in finished");
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(kind = %kind, error = %e, "Sign-in failed");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl JobExecutor for Orchestrator {
    async fn auto_sign(&self) -> AppResult<()> {
        self.run_auto().await
    }

    async fn resume_on_startup(&self) -> AppResult<()> {
        self.recover_on_boot().await.map(|_| ())
    }

    async fn clear_sign_records(&self) -> AppResult<u64> {
        self.cleanup_sign_records().await
    }
}
