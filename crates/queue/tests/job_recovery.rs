//! Restart recovery integration tests.
//!
//! A job is started and interrupted, a fresh store is opened on the same file
//! as a restarted process would, and recovery drives the job to completion.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rover_common::{AppResult, Metrics, ScheduleConfig};
use rover_core::{
    BindingResolver, BroadcastTarget, ChannelKind, HookRegistry, MessageSender, ObservedSender,
    OutboundMessage, SendHook, SendObserved,
};
use rover_db::repositories::SignRecordRepository;
use rover_queue::{
    BroadcastBatch, BroadcastDispatcher, BroadcastEntry, JobKind, JobStateStore, Orchestrator,
    PacingConfig, ProgressReporter, ResultNotifier, SignOutcome, SignRunner,
};
use sea_orm::{DatabaseBackend, MockDatabase};
use serde_json::Value;

const DAY: Duration = Duration::from_secs(86_400);

struct BatchRunner {
    calls: Mutex<Vec<(JobKind, u64)>>,
}

#[async_trait]
impl SignRunner for BatchRunner {
    async fn run(
        &self,
        kind: JobKind,
        resume_from: u64,
        progress: &ProgressReporter,
    ) -> AppResult<SignOutcome> {
        self.calls.lock().unwrap().push((kind, resume_from));
        progress.update_progress(20).await;

        let mut batch = BroadcastBatch::new();
        batch.push(
            ChannelKind::Direct,
            BroadcastEntry::new("u1", "onebot", vec![OutboundMessage::text("signed")]),
        );
        batch.push(
            ChannelKind::Group,
            BroadcastEntry::new("g-unbound", "", vec![OutboundMessage::text("lost")]),
        );
        Ok(SignOutcome {
            summary: "20/20 signed".to_string(),
            broadcast: Some(batch),
        })
    }
}

#[derive(Default)]
struct Outbox(Mutex<Vec<String>>);

#[async_trait]
impl MessageSender for Outbox {
    async fn send(
        &self,
        _message: &OutboundMessage,
        target: &BroadcastTarget,
        _extra: Option<&Value>,
    ) -> AppResult<()> {
        self.0.lock().unwrap().push(target.recipient_id.clone());
        Ok(())
    }
}

#[derive(Default)]
struct SendCounter(Mutex<usize>);

#[async_trait]
impl SendHook for SendCounter {
    async fn on_send(&self, _event: &SendObserved) -> AppResult<()> {
        *self.0.lock().unwrap() += 1;
        Ok(())
    }
}

struct NoBindings;

#[async_trait]
impl BindingResolver for NoBindings {
    async fn resolve(&self, _: ChannelKind, _: &str, _: &str) -> AppResult<Option<String>> {
        Ok(None)
    }
}

#[derive(Default)]
struct Summaries(Mutex<Vec<String>>);

#[async_trait]
impl ResultNotifier for Summaries {
    async fn notify(&self, summary: &str) -> AppResult<usize> {
        self.0.lock().unwrap().push(summary.to_string());
        Ok(1)
    }
}

#[tokio::test]
async fn test_interrupted_auto_job_is_recovered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signing_state.json");

    // First process: the job starts and gets interrupted after 10 items
    {
        let store = JobStateStore::new(&path, DAY, Arc::new(Metrics::new()));
        store.begin(JobKind::Auto).await.unwrap();
        store.set_total(20).await;
        store.update_progress(10).await;
    }

    // Second process
    let metrics = Arc::new(Metrics::new());
    let store = Arc::new(JobStateStore::new(&path, DAY, metrics.clone()));
    let state = store.active_state().await.unwrap();
    assert_eq!(state.kind, JobKind::Auto);
    assert_eq!(state.completed, Some(10));

    let registry = Arc::new(HookRegistry::new(metrics.clone()));
    let counter = Arc::new(SendCounter::default());
    registry.namespace("Observer").register_send_hook(counter.clone());
    let outbox = Outbox::default();
    let observed = Arc::new(ObservedSender::new(outbox, registry.clone()));
    let sender: Arc<dyn MessageSender> =
        Arc::new(observed.attributed(registry.namespace("RoverSign").origin()));

    let runner = Arc::new(BatchRunner {
        calls: Mutex::new(Vec::new()),
    });
    let summaries = Arc::new(Summaries::default());
    let dispatcher = Arc::new(BroadcastDispatcher::new(
        sender,
        Arc::new(NoBindings),
        PacingConfig::immediate(),
        metrics.clone(),
    ));
    let orchestrator = Orchestrator::new(
        store.clone(),
        runner.clone(),
        summaries.clone(),
        dispatcher,
        SignRecordRepository::new(Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        )),
        ScheduleConfig::default(),
        metrics.clone(),
    );

    let recovered = orchestrator.recover_on_boot().await.unwrap();

    assert_eq!(recovered, Some(JobKind::Auto));
    assert_eq!(*runner.calls.lock().unwrap(), vec![(JobKind::Auto, 10)]);
    assert_eq!(*summaries.0.lock().unwrap(), vec!["20/20 signed".to_string()]);
    assert_eq!(*counter.0.lock().unwrap(), 1);
    assert!(store.active_state().await.is_none());

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.jobs_recovered, 1);
    assert_eq!(snapshot.broadcast_delivered, 1);
    assert_eq!(snapshot.broadcast_skipped, 1);
}

#[tokio::test]
async fn test_restart_from_zero_when_resume_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signing_state.json");
    let metrics = Arc::new(Metrics::new());
    let store = Arc::new(JobStateStore::new(&path, DAY, metrics.clone()));
    store.begin(JobKind::Manual).await.unwrap();
    store.update_progress(5).await;

    let runner = Arc::new(BatchRunner {
        calls: Mutex::new(Vec::new()),
    });
    let orchestrator = Orchestrator::new(
        store.clone(),
        runner.clone(),
        Arc::new(Summaries::default()),
        Arc::new(BroadcastDispatcher::new(
            Arc::new(Outbox::default()),
            Arc::new(NoBindings),
            PacingConfig::immediate(),
            metrics.clone(),
        )),
        SignRecordRepository::new(Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
        )),
        ScheduleConfig {
            resume_from_progress: false,
            ..Default::default()
        },
        metrics,
    );

    orchestrator.recover_on_boot().await.unwrap();

    assert_eq!(*runner.calls.lock().unwrap(), vec![(JobKind::Manual, 0)]);
    assert!(store.active_state().await.is_none());
}
