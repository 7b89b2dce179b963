//! User actions travel from the substrate entry point through the module's
//! own activity hook into the aggregator and out to the activity table.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rover_common::{AppResult, Metrics};
use rover_core::{
    ActivityAggregator, ActivityQueryService, ActivityRecorder, BindingRefresher, BroadcastTarget,
    GatedActivitySink, HookRegistry, MessageSender, ObservedSender, Origin, OutboundMessage,
    WriteGate, observers,
};
use rover_db::entities::user_activity;
use rover_db::repositories::{ActivityKey, GroupBindingRepository, UserActivityRepository};
use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
use serde_json::Value;

const NAMESPACE: &str = "RoverSign";

struct Silent;

#[async_trait]
impl MessageSender for Silent {
    async fn send(
        &self,
        _message: &OutboundMessage,
        _target: &BroadcastTarget,
        _extra: Option<&Value>,
    ) -> AppResult<()> {
        Ok(())
    }
}

fn exec_ok() -> MockExecResult {
    MockExecResult {
        last_insert_id: 0,
        rows_affected: 1,
    }
}

#[tokio::test]
async fn test_own_actions_are_persisted_once_per_key() {
    let metrics = Arc::new(Metrics::new());
    let db = Arc::new(
        MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_ok(), exec_ok()])
            .into_connection(),
    );
    let gate = Arc::new(WriteGate::new(
        "activity",
        Duration::from_secs(30),
        metrics.clone(),
    ));
    let aggregator = Arc::new(ActivityAggregator::new(
        Arc::new(GatedActivitySink::new(
            UserActivityRepository::new(db.clone()),
            gate.clone(),
        )),
        Duration::from_secs(60),
        metrics.clone(),
    ));

    let registry = Arc::new(HookRegistry::new(metrics.clone()));
    let namespace = registry.namespace(NAMESPACE);
    let recorder = Arc::new(ActivityRecorder::new(NAMESPACE, aggregator.clone()));
    let refresher = Arc::new(BindingRefresher::new(GroupBindingRepository::new(db), gate));
    observers::install(&namespace, &recorder, &refresher);
    // A plugin reload installs the same hooks again
    observers::install(&registry.namespace(NAMESPACE), &recorder, &refresher);
    assert_eq!(namespace.activity_hook_count(), 1);
    assert_eq!(namespace.send_hook_count(), 1);

    let sender = ObservedSender::new(Silent, registry);
    for _ in 0..3 {
        sender
            .user_acted(namespace.origin(), "u1", "onebot", "10001")
            .await;
    }
    sender
        .user_acted(namespace.origin(), "u2", "onebot", "10001")
        .await;
    let foreign = sender
        .user_acted(Origin::namespace("OtherPlugin"), "u3", "onebot", "10001")
        .await;
    assert_eq!(foreign.invoked, 1);
    assert_eq!(foreign.failed, 0);

    assert_eq!(aggregator.pending(), 2);
    let report = aggregator.flush().await;
    assert_eq!(report.written, 2);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.activity_signals, 4);
    assert_eq!(snapshot.activity_rows_flushed, 2);
}

#[tokio::test]
async fn test_activity_query_window() {
    let recent = user_activity::Model {
        id: "a1".into(),
        user_id: "u1".into(),
        bot_id: "onebot".into(),
        bot_self_id: "10001".into(),
        last_active_at: (chrono::Utc::now() - chrono::Duration::days(3)).fixed_offset(),
    };
    let db = Arc::new(
        MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[recent.clone()]])
            .append_query_results([[recent]])
            .into_connection(),
    );
    let query = ActivityQueryService::new(UserActivityRepository::new(db), 2);

    let key = ActivityKey::new("u1", "onebot", "10001");
    assert!(query.last_active_at(&key).await.unwrap().is_some());
    assert!(!query.is_user_active(&key).await.unwrap());
}
