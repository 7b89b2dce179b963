//! Hooks this module installs in its own namespace.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rover_common::AppResult;
use rover_db::repositories::{ActivityKey, GroupBindingRepository};
use tokio_util::task::TaskTracker;

use super::activity::{ActivityAggregator, ActivitySignal};
use super::hooks::{ActivityHook, ActivityObserved, HookNamespace, SendHook, SendObserved};
use super::messaging::ChannelKind;
use super::write_gate::WriteGate;

/// Feeds activity initiated by this module into the aggregator.
pub struct ActivityRecorder {
    namespace: String,
    aggregator: Arc<ActivityAggregator>,
}

impl ActivityRecorder {
    pub fn new(namespace: impl Into<String>, aggregator: Arc<ActivityAggregator>) -> Self {
        Self {
            namespace: namespace.into(),
            aggregator,
        }
    }
}

#[async_trait]
impl ActivityHook for ActivityRecorder {
    async fn on_activity(&self, event: &ActivityObserved) -> AppResult<()> {
        if !event.initiated_by(&self.namespace) {
            return Ok(());
        }

        self.aggregator.record(ActivitySignal {
            key: ActivityKey::new(&event.user_id, &event.bot_id, &event.bot_self_id),
            observed_at: event.observed_at,
        });
        Ok(())
    }
}

/// Remembers which bot account last spoke in each group.
///
/// The write happens in a background task so the observed send is not held
/// up by the database or the gate. Call [`BindingRefresher::drain`] on
/// shutdown to let pending writes land.
pub struct BindingRefresher {
    groups: GroupBindingRepository,
    gate: Arc<WriteGate>,
    tracker: TaskTracker,
}

impl BindingRefresher {
    #[must_use]
    pub fn new(groups: GroupBindingRepository, gate: Arc<WriteGate>) -> Self {
        Self {
            groups,
            gate,
            tracker: TaskTracker::new(),
        }
    }

    /// Background writes not yet finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait up to `grace` for background writes. Returns `true` if all finished.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            tracing::debug!(pending, "Group binding writes drained");
            true
        } else {
            tracing::warn!(
                remaining = self.tracker.len(),
                grace = ?grace,
                "Group binding writes still pending at shutdown"
            );
            false
        }
    }

    /// `(group_id, bot_self_id)` to store for a send, if any.
    fn binding_for(event: &SendObserved) -> Option<(String, String)> {
        let target = &event.target;
        (target.channel_kind == ChannelKind::Group && target.is_resolved())
            .then(|| (target.recipient_id.clone(), target.bot_self_id.clone()))
    }

    /// Store the binding behind the write gate.
    pub async fn refresh(&self, group_id: &str, bot_self_id: &str) -> AppResult<()> {
        bind_gated(&self.groups, &self.gate, group_id, bot_self_id).await
    }
}

async fn bind_gated(
    groups: &GroupBindingRepository,
    gate: &WriteGate,
    group_id: &str,
    bot_self_id: &str,
) -> AppResult<()> {
    gate.run(|| groups.bind(group_id, bot_self_id)).await
}

#[async_trait]
impl SendHook for BindingRefresher {
    async fn on_send(&self, event: &SendObserved) -> AppResult<()> {
        let Some((group_id, bot_self_id)) = Self::binding_for(event) else {
            return Ok(());
        };

        let groups = self.groups.clone();
        let gate = self.gate.clone();
        self.tracker.spawn(async move {
            match bind_gated(&groups, &gate, &group_id, &bot_self_id).await {
                Ok(()) => {
                    tracing::debug!(group_id = %group_id, bot_self_id = %bot_self_id, "Refreshed group binding");
                }
                Err(e) => {
                    tracing::warn!(group_id = %group_id, error = %e, "Failed to refresh group binding");
                }
            }
        });
        Ok(())
    }
}

/// Register both hooks in `namespace`. Safe to call more than once with the same hooks.
pub fn install(
    namespace: &HookNamespace,
    recorder: &Arc<ActivityRecorder>,
    refresher: &Arc<BindingRefresher>,
) {
    namespace.register_activity_hook(recorder.clone());
    namespace.register_send_hook(refresher.clone());
    tracing::info!(namespace = %namespace.name(), "Installed hooks");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::activity::{ActivitySink, FlushReport};
    use crate::services::hooks::{HookRegistry, Origin};
    use crate::services::messaging::{BroadcastTarget, OutboundMessage};
    use chrono::Utc;
    use rover_common::Metrics;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MemorySink(Mutex<Vec<ActivitySignal>>);

    #[async_trait]
    impl ActivitySink for MemorySink {
        async fn upsert(&self, signal: &ActivitySignal) -> AppResult<()> {
            self.0.lock().unwrap().push(signal.clone());
            Ok(())
        }
    }

    fn activity(origin: Origin, user_id: &str) -> ActivityObserved {
        ActivityObserved {
            user_id: user_id.into(),
            bot_id: "onebot".into(),
            bot_self_id: "10001".into(),
            observed_at: Utc::now(),
            origin,
        }
    }

    fn gate() -> Arc<WriteGate> {
        Arc::new(WriteGate::new(
            "binding",
            Duration::from_secs(1),
            Arc::new(Metrics::new()),
        ))
    }

    #[tokio::test]
    async fn test_recorder_ignores_foreign_origin() {
        let metrics = Arc::new(Metrics::new());
        let registry = HookRegistry::new(metrics.clone());
        let sink = Arc::new(MemorySink::default());
        let aggregator = Arc::new(ActivityAggregator::new(
            sink.clone(),
            Duration::from_secs(60),
            metrics,
        ));
        let ns = registry.namespace("RoverSign");
        ns.register_activity_hook(Arc::new(ActivityRecorder::new("RoverSign", aggregator.clone())));

        registry
            .dispatch_activity(&activity(ns.origin(), "mine"))
            .await;
        registry
            .dispatch_activity(&activity(Origin::namespace("OtherPlugin"), "theirs"))
            .await;
        registry
            .dispatch_activity(&activity(Origin::External, "nobody"))
            .await;

        assert_eq!(aggregator.flush().await, FlushReport { written: 1, failed: 0 });
        assert_eq!(sink.0.lock().unwrap()[0].key.user_id, "mine");
    }

    #[test]
    fn test_binding_only_for_resolved_groups() {
        let event = |target: BroadcastTarget| SendObserved {
            message: OutboundMessage::text("x"),
            target,
            origin: Origin::External,
        };

        assert_eq!(
            BindingRefresher::binding_for(&event(
                BroadcastTarget::new(ChannelKind::Group, "g1", "onebot").with_bot_self_id("10001")
            )),
            Some(("g1".to_string(), "10001".to_string()))
        );
        assert!(
            BindingRefresher::binding_for(&event(BroadcastTarget::new(
                ChannelKind::Group,
                "g1",
                "onebot"
            )))
            .is_none()
        );
        assert!(
            BindingRefresher::binding_for(&event(
                BroadcastTarget::new(ChannelKind::Direct, "u1", "onebot").with_bot_self_id("10001")
            ))
            .is_none()
        );
    }

    fn group_send(group_id: &str) -> SendObserved {
        SendObserved {
            message: OutboundMessage::text("x"),
            target: BroadcastTarget::new(ChannelKind::Group, group_id, "onebot")
                .with_bot_self_id("10001"),
            origin: Origin::External,
        }
    }

    #[tokio::test]
    async fn test_drain_waits_for_background_write() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );
        let refresher = BindingRefresher::new(GroupBindingRepository::new(db), gate());

        refresher.on_send(&group_send("g1")).await.unwrap();

        assert!(refresher.drain(Duration::from_secs(5)).await);
        assert_eq!(refresher.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_gives_up_after_grace() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let gate = Arc::new(WriteGate::new(
            "binding",
            Duration::from_secs(30),
            Arc::new(Metrics::new()),
        ));
        let refresher = BindingRefresher::new(GroupBindingRepository::new(db), gate.clone());
        let _held = gate.acquire().await.unwrap();

        refresher.on_send(&group_send("g1")).await.unwrap();

        assert!(!refresher.drain(Duration::from_secs(1)).await);
        assert_eq!(refresher.pending(), 1);
    }

    #[tokio::test]
    async fn test_refresh_writes_binding() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );
        let refresher = BindingRefresher::new(GroupBindingRepository::new(db), gate());

        assert!(refresher.refresh("g1", "10001").await.is_ok());
    }
}
