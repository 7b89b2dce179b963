//! Activity aggregation.
//!
//! User actions arrive far more often than they need to be stored. The
//! aggregator keeps only the latest signal per key and writes the buffer out
//! on a fixed interval. Concurrent `record` calls during a flush land in the
//! fresh buffer left behind by the snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rover_common::{AppResult, Metrics};
use rover_db::repositories::{ActivityKey, UserActivityRepository};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::write_gate::WriteGate;

/// Latest known action of one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivitySignal {
    pub key: ActivityKey,
    pub observed_at: DateTime<Utc>,
}

/// Persistent destination of flushed activity.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn upsert(&self, signal: &ActivitySignal) -> AppResult<()>;
}

/// Writes activity rows through the write gate.
pub struct GatedActivitySink {
    repo: UserActivityRepository,
    gate: Arc<WriteGate>,
}

impl GatedActivitySink {
    #[must_use]
    pub const fn new(repo: UserActivityRepository, gate: Arc<WriteGate>) -> Self {
        Self { repo, gate }
    }
}

#[async_trait]
impl ActivitySink for GatedActivitySink {
    async fn upsert(&self, signal: &ActivitySignal) -> AppResult<()> {
        self.gate
            .run(|| self.repo.upsert(&signal.key, signal.observed_at))
            .await
    }
}

/// Result of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub written: usize,
    pub failed: usize,
}

/// Last-write-wins activity buffer.
pub struct ActivityAggregator {
    buffer: Mutex<HashMap<ActivityKey, ActivitySignal>>,
    sink: Arc<dyn ActivitySink>,
    interval: Duration,
    metrics: Arc<Metrics>,
}

impl ActivityAggregator {
    #[must_use]
    pub fn new(sink: Arc<dyn ActivitySink>, interval: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            buffer: Mutex::new(HashMap::new()),
            sink,
            interval,
            metrics,
        }
    }

    /// Buffer a signal, replacing any pending one for the same key.
    pub fn record(&self, signal: ActivitySignal) {
        self.metrics.record_activity_signal();
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(signal.key.clone(), signal);
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn take_snapshot(&self) -> HashMap<ActivityKey, ActivitySignal> {
        std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Write out everything buffered so far.
    ///
    /// A failed upsert is logged and dropped; it is not re-buffered.
    pub async fn flush(&self) -> FlushReport {
        let snapshot = self.take_snapshot();
        let mut report = FlushReport::default();
        if snapshot.is_empty() {
            return report;
        }

        for signal in snapshot.into_values() {
            match self.sink.upsert(&signal).await {
                Ok(()) => {
                    report.written += 1;
                    self.metrics.record_activity_flush(true);
                }
                Err(e) => {
                    report.failed += 1;
                    self.metrics.record_activity_flush(false);
                    tracing::error!(
                        user_id = %signal.key.user_id,
                        bot_id = %signal.key.bot_id,
                        error = %e,
                        "Failed to persist user activity"
                    );
                }
            }
        }

        tracing::info!(
            written = report.written,
            failed = report.failed,
            "Flushed user activity"
        );
        report
    }

    /// Start the periodic flush loop.
    #[must_use]
    pub fn start(self: &Arc<Self>) -> FlushTask {
        let token = CancellationToken::new();
        let aggregator = self.clone();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move { aggregator.run(loop_token).await });

        FlushTask {
            aggregator: self.clone(),
            token,
            handle,
        }
    }

    async fn run(&self, token: CancellationToken) {
        tracing::info!(interval = ?self.interval, "Activity flush loop started");
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {
                    self.flush().await;
                }
            }
        }
        tracing::info!("Activity flush loop stopped");
    }
}

/// Handle to a running flush loop.
pub struct FlushTask {
    aggregator: Arc<ActivityAggregator>,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl FlushTask {
    /// Stop the loop and flush whatever is still buffered.
    ///
    /// The loop gets `grace` to reach its next wait point; past that it is
    /// aborted. The final flush runs either way.
    pub async fn shutdown(mut self, grace: Duration) -> FlushReport {
        self.token.cancel();
        match tokio::time::timeout(grace, &mut self.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Activity flush loop ended abnormally");
            }
            Err(_) => {
                tracing::warn!(grace = ?grace, "Activity flush loop did not stop in time, aborting");
                self.handle.abort();
            }
        }

        let pending = self.aggregator.pending();
        let report = self.aggregator.flush().await;
        tracing::info!(pending, written = report.written, "Final activity flush done");
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rover_common::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemorySink {
        written: Mutex<Vec<ActivitySignal>>,
        fail_user: Option<&'static str>,
    }

    #[async_trait]
    impl ActivitySink for MemorySink {
        async fn upsert(&self, signal: &ActivitySignal) -> AppResult<()> {
            if self.fail_user == Some(signal.key.user_id.as_str()) {
                return Err(AppError::Database("disk full".into()));
            }
            self.written.lock().unwrap().push(signal.clone());
            Ok(())
        }
    }

    /// Sink that never finishes, to force the abort path.
    struct StuckSink(AtomicUsize);

    #[async_trait]
    impl ActivitySink for StuckSink {
        async fn upsert(&self, _signal: &ActivitySignal) -> AppResult<()> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    fn signal(user_id: &str, seconds: i64) -> ActivitySignal {
        ActivitySignal {
            key: ActivityKey::new(user_id, "onebot", "10001"),
            observed_at: DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap(),
        }
    }

    fn aggregator(sink: Arc<dyn ActivitySink>) -> Arc<ActivityAggregator> {
        Arc::new(ActivityAggregator::new(
            sink,
            Duration::from_secs(60),
            Arc::new(Metrics::new()),
        ))
    }

    #[tokio::test]
    async fn test_signals_coalesce_to_latest() {
        let sink = Arc::new(MemorySink::default());
        let aggregator = aggregator(sink.clone());

        for i in 0..50 {
            aggregator.record(signal("u1", i));
        }
        assert_eq!(aggregator.pending(), 1);

        let report = aggregator.flush().await;

        assert_eq!(report, FlushReport { written: 1, failed: 0 });
        let written = sink.written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0], signal("u1", 49));
    }

    #[tokio::test]
    async fn test_flush_clears_buffer() {
        let sink = Arc::new(MemorySink::default());
        let aggregator = aggregator(sink.clone());

        aggregator.record(signal("u1", 0));
        aggregator.record(signal("u2", 0));
        aggregator.flush().await;
        let second = aggregator.flush().await;

        assert_eq!(second, FlushReport::default());
        assert_eq!(sink.written.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_upsert_is_dropped() {
        let sink = Arc::new(MemorySink {
            fail_user: Some("bad"),
            ..Default::default()
        });
        let aggregator = aggregator(sink.clone());

        aggregator.record(signal("bad", 0));
        aggregator.record(signal("good", 0));
        let report = aggregator.flush().await;

        assert_eq!(report, FlushReport { written: 1, failed: 1 });
        assert_eq!(aggregator.pending(), 0);
        assert_eq!(aggregator.flush().await.written, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush() {
        let sink = Arc::new(MemorySink::default());
        let aggregator = aggregator(sink.clone());
        let task = aggregator.start();

        aggregator.record(signal("u1", 0));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(sink.written.lock().unwrap().len(), 1);

        task.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending() {
        let sink = Arc::new(MemorySink::default());
        let aggregator = aggregator(sink.clone());
        let task = aggregator.start();

        for user in ["u1", "u2", "u3", "u4"] {
            aggregator.record(signal(user, 0));
        }
        let report = task.shutdown(Duration::from_secs(5)).await;

        assert_eq!(report.written, 4);
        assert_eq!(sink.written.lock().unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_stuck_loop() {
        let sink = Arc::new(StuckSink(AtomicUsize::new(0)));
        let aggregator = aggregator(sink);
        let task = aggregator.start();

        aggregator.record(signal("u1", 0));
        // Let the loop pick up u1 and hang in the sink
        tokio::time::sleep(Duration::from_secs(61)).await;
        aggregator.record(signal("u2", 0));

        let report = task.shutdown(Duration::from_secs(5)).await;
        assert_eq!(report.written, 1);
    }
}
