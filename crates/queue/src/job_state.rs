//! Single-slot, file-backed record of the running sign-in job.
//!
//! The file exists exactly while a job is in flight. It survives restarts so
//! an interrupted job can be picked up again, and a record older than the
//! stale threshold is discarded on read.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use rover_common::{AppResult, Metrics};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What started the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Started by the scheduler.
    Auto,
    /// Started by a user command.
    Manual,
}

impl JobKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }

    /// Name shown to users.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Auto => "auto sign-in",
            Self::Manual => "sign-in for all",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    #[serde(rename = "type")]
    pub kind: JobKind,
    #[serde(rename = "start_time", with = "local_time")]
    pub started_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<u64>,
    #[serde(
        rename = "update_time",
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_local_time"
    )]
    pub updated_at: Option<NaiveDateTime>,
}

impl JobState {
    #[must_use]
    pub const fn new(kind: JobKind, started_at: NaiveDateTime) -> Self {
        Self {
            kind,
            started_at,
            total: None,
            completed: None,
            updated_at: None,
        }
    }

    /// Whether the record is older than `threshold` at `now`.
    #[must_use]
    pub fn is_stale_at(&self, now: NaiveDateTime, threshold: Duration) -> bool {
        let elapsed = (now - self.started_at).num_seconds();
        i64::try_from(threshold.as_secs()).is_ok_and(|limit| elapsed > limit)
    }
}

/// `begin` found another job in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a {active} job is already running")]
pub struct JobBusy {
    pub active: JobKind,
}

impl JobBusy {
    /// Reply for the user who asked for a run.
    #[must_use]
    pub fn user_message(&self) -> String {
        format!(
            "[RoverSign] {} is in progress, please try again later.",
            self.active.label()
        )
    }
}

/// The state file exists but cannot be used.
#[derive(Debug, Error)]
pub enum StateReadError {
    #[error("failed to read state file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse state file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Owner of the job-state file.
pub struct JobStateStore {
    path: PathBuf,
    stale_after: Duration,
    metrics: Arc<Metrics>,
    // Serializes every read-modify-write and delete of the file.
    slot: Mutex<()>,
}

impl JobStateStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, stale_after: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            path: path.into(),
            stale_after,
            metrics,
            slot: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Claim the slot for `kind`.
    pub async fn begin(&self, kind: JobKind) -> Result<(), JobBusy> {
        let _slot = self.slot.lock().await;

        if let Some(active) = self.inspect(now()).await {
            self.metrics.record_job_rejected();
            tracing::info!(requested = %kind, active = %active.kind, "Job already running");
            return Err(JobBusy { active: active.kind });
        }

        let state = JobState::new(kind, now());
        match self.write(&state).await {
            Ok(()) => tracing::info!(kind = %kind, "Job state created"),
            Err(e) => tracing::error!(kind = %kind, error = %e, "Failed to create job state"),
        }
        self.metrics.record_job_started();
        Ok(())
    }

    /// Current record, or `None` when idle.
    ///
    /// Stale and unreadable records are deleted and read as `None`.
    pub async fn active_state(&self) -> Option<JobState> {
        self.active_state_at(now()).await
    }

    pub async fn active_state_at(&self, now: NaiveDateTime) -> Option<JobState> {
        let _slot = self.slot.lock().await;
        self.inspect(now).await
    }

    // Caller holds `slot`.
    async fn inspect(&self, now: NaiveDateTime) -> Option<JobState> {
        let state = match self.read().await {
            Ok(state) => state?,
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Discarding unreadable job state");
                self.remove().await;
                return None;
            }
        };

        if state.is_stale_at(now, self.stale_after) {
            let elapsed_secs = (now - state.started_at).num_seconds();
            tracing::warn!(kind = %state.kind, elapsed_secs, "Discarding stale job state");
            self.remove().await;
            return None;
        }

        Some(state)
    }

    /// Record the number of work items of the current job.
    pub async fn set_total(&self, total: u64) {
        self.modify(|state| {
            state.total = Some(total);
            state.completed = Some(state.completed.unwrap_or(0));
        })
        .await;
    }

    /// Record how many work items are done.
    pub async fn update_progress(&self, completed: u64) {
        self.modify(|state| {
            state.completed = Some(completed);
            state.updated_at = Some(now());
        })
        .await;
    }

    async fn modify<F: FnOnce(&mut JobState)>(&self, apply: F) {
        let _slot = self.slot.lock().await;
        let mut state = match self.read().await {
            Ok(Some(state)) => state,
            Ok(None) => {
                tracing::warn!("Cannot update job progress, no job state");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot update job progress");
                return;
            }
        };

        apply(&mut state);
        if let Err(e) = self.write(&state).await {
            tracing::error!(error = %e, "Failed to update job state");
        } else {
            tracing::debug!(completed = ?state.completed, total = ?state.total, "Job progress updated");
        }
    }

    /// Delete the record. Idempotent.
    pub async fn end(&self) {
        let _slot = self.slot.lock().await;
        self.remove().await;
    }

    async fn remove(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => tracing::info!("Job state cleared"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::error!(error = %e, "Failed to clear job state"),
        }
    }

    async fn read(&self) -> Result<Option<JobState>, StateReadError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    // Write-then-rename so a crash never leaves a torn record.
    async fn write(&self, state: &JobState) -> AppResult<()> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

mod local_time {
    use super::TIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

mod opt_local_time {
    use super::TIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_str(&value.format(TIME_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| NaiveDateTime::parse_from_str(&raw, TIME_FORMAT))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}
