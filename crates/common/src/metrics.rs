//! Metrics collection for roversign-rs.
//!
//! Plain atomic counters. One [`Metrics`] value is created at startup and
//! shared as `Arc<Metrics>` with every component that reports into it.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process counters.
#[derive(Debug, Default)]
pub struct Metrics {
    // === Activity ===
    /// Activity signals accepted into the buffer
    pub activity_signals: AtomicU64,
    /// Activity rows written by flushes
    pub activity_rows_flushed: AtomicU64,
    /// Activity rows dropped because the upsert failed
    pub activity_flush_failures: AtomicU64,

    // === Persistence ===
    /// Gated writes abandoned on lock timeout
    pub write_gate_timeouts: AtomicU64,

    // === Hooks ===
    /// Observer callbacks that returned an error or panicked
    pub hook_failures: AtomicU64,

    // === Broadcast ===
    pub broadcast_delivered: AtomicU64,
    pub broadcast_failed: AtomicU64,
    /// Recipients skipped for lack of a routing binding
    pub broadcast_skipped: AtomicU64,

    // === Jobs ===
    pub jobs_started: AtomicU64,
    pub jobs_completed: AtomicU64,
    /// `begin` calls rejected because a job was already running
    pub jobs_rejected_busy: AtomicU64,
    /// Jobs re-driven after a restart
    pub jobs_recovered: AtomicU64,
}

impl Metrics {
    /// Create a new metrics instance with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_activity_signal(&self) {
        self.activity_signals.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one flushed activity row.
    pub fn record_activity_flush(&self, success: bool) {
        if success {
            self.activity_rows_flushed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.activity_flush_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_write_gate_timeout(&self) {
        self.write_gate_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hook_failure(&self) {
        self.hook_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one delivery attempt.
    pub fn record_delivery(&self, success: bool) {
        if success {
            self.broadcast_delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.broadcast_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_delivery_skipped(&self) {
        self.broadcast_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_started(&self) {
        self.jobs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_rejected(&self) {
        self.jobs_rejected_busy.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_recovered(&self) {
        self.jobs_recovered.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            activity_signals: self.activity_signals.load(Ordering::Relaxed),
            activity_rows_flushed: self.activity_rows_flushed.load(Ordering::Relaxed),
            activity_flush_failures: self.activity_flush_failures.load(Ordering::Relaxed),
            write_gate_timeouts: self.write_gate_timeouts.load(Ordering::Relaxed),
            hook_failures: self.hook_failures.load(Ordering::Relaxed),
            broadcast_delivered: self.broadcast_delivered.load(Ordering::Relaxed),
            broadcast_failed: self.broadcast_failed.load(Ordering::Relaxed),
            broadcast_skipped: self.broadcast_skipped.load(Ordering::Relaxed),
            jobs_started: self.jobs_started.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_rejected_busy: self.jobs_rejected_busy.load(Ordering::Relaxed),
            jobs_recovered: self.jobs_recovered.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub activity_signals: u64,
    pub activity_rows_flushed: u64,
    pub activity_flush_failures: u64,
    pub write_gate_timeouts: u64,
    pub hook_failures: u64,
    pub broadcast_delivered: u64,
    pub broadcast_failed: u64,
    pub broadcast_skipped: u64,
    pub jobs_started: u64,
    pub jobs_completed: u64,
    pub jobs_rejected_busy: u64,
    pub jobs_recovered: u64,
}
