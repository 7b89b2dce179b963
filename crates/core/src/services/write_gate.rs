//! Bounded-wait write gate.
//!
//! Serializes the persistence writes that race with each other. A caller
//! that cannot get the lock within the timeout gives up with
//! [`AppError::LockTimeout`] instead of queueing forever. Build one gate per
//! family of conflicting writes and share it as `Arc<WriteGate>`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rover_common::{AppError, AppResult, Metrics};
use tokio::sync::{Mutex, MutexGuard};

/// Mutual exclusion with a bounded acquisition wait.
#[derive(Debug)]
pub struct WriteGate {
    name: &'static str,
    lock: Mutex<()>,
    timeout: Duration,
    metrics: Arc<Metrics>,
}

/// Held while a gated write runs; releases the gate on drop.
pub type WriteGuard<'a> = MutexGuard<'a, ()>;

impl WriteGate {
    #[must_use]
    pub fn new(name: &'static str, timeout: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            name,
            lock: Mutex::new(()),
            timeout,
            metrics,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait up to the configured timeout for the gate.
    pub async fn acquire(&self) -> AppResult<WriteGuard<'_>> {
        if let Ok(guard) = tokio::time::timeout(self.timeout, self.lock.lock()).await {
            Ok(guard)
        } else {
            self.metrics.record_write_gate_timeout();
            tracing::warn!(
                gate = self.name,
                timeout = ?self.timeout,
                "Write gate timed out, abandoning write"
            );
            Err(AppError::LockTimeout(self.timeout))
        }
    }

    /// Run `op` while holding the gate.
    ///
    /// The future is not polled at all when the gate times out.
    pub async fn run<F, Fut, T>(&self, op: F) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let _guard = self.acquire().await?;
        op().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn gate(timeout: Duration) -> (Arc<WriteGate>, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        (
            Arc::new(WriteGate::new("test", timeout, metrics.clone())),
            metrics,
        )
    }

    #[tokio::test]
    async fn test_run_returns_value() {
        let (gate, _) = gate(Duration::from_secs(1));
        let value = gate.run(|| async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_run_propagates_operation_error() {
        let (gate, metrics) = gate(Duration::from_secs(1));
        let result: AppResult<()> = gate
            .run(|| async { Err(AppError::Database("boom".into())) })
            .await;
        assert!(matches!(result, Err(AppError::Database(_))));
        assert_eq!(metrics.snapshot().write_gate_timeouts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_while_held() {
        let (gate, metrics) = gate(Duration::from_secs(30));
        let _held = gate.acquire().await.unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let result = gate
            .run(|| async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(AppError::LockTimeout(d)) if d == Duration::from_secs(30)));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(metrics.snapshot().write_gate_timeouts, 1);
    }

    #[tokio::test]
    async fn test_released_after_run() {
        let (gate, _) = gate(Duration::from_millis(50));
        gate.run(|| async { Ok(()) }).await.unwrap();
        assert!(gate.acquire().await.is_ok());
    }
}
