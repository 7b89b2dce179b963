//! Pushes a finished job's summary to its subscribers.

use std::sync::Arc;

use async_trait::async_trait;
use rover_common::AppResult;
use rover_core::{BroadcastTarget, ChannelKind, MessageSender, OutboundMessage};
use rover_db::entities::subscription::SubscriptionChannel;
use rover_db::repositories::SubscriptionRepository;

/// Task name of the sign-in summary subscription.
pub const SIGN_RESULT_TASK: &str = "sign_result";

/// Delivers a job summary to whoever asked for it.
#[async_trait]
pub trait ResultNotifier: Send + Sync {
    /// Returns the number of subscribers reached.
    async fn notify(&self, summary: &str) -> AppResult<usize>;
}

/// Sends the summary to every subscriber of a task.
pub struct SubscriptionNotifier {
    task_name: String,
    subscriptions: SubscriptionRepository,
    sender: Arc<dyn MessageSender>,
}

impl SubscriptionNotifier {
    pub fn new(
        task_name: impl Into<String>,
        subscriptions: SubscriptionRepository,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            task_name: task_name.into(),
            subscriptions,
            sender,
        }
    }
}

#[async_trait]
impl ResultNotifier for SubscriptionNotifier {
    async fn notify(&self, summary: &str) -> AppResult<usize> {
        let subscribers = self.subscriptions.find_by_task(&self.task_name).await?;
        if subscribers.is_empty() {
            return Ok(0);
        }

        tracing::info!(task = %self.task_name, subscribers = subscribers.len(), "Pushing job summary");
        let message = OutboundMessage::text(summary);
        let mut reached = 0;
        for sub in &subscribers {
            let kind = match sub.channel_kind {
                SubscriptionChannel::Direct => ChannelKind::Direct,
                SubscriptionChannel::Group => ChannelKind::Group,
            };
            let target = BroadcastTarget::new(kind, sub.recipient_id(), &sub.bot_id)
                .with_bot_self_id(&sub.bot_self_id);

            match self.sender.send(&message, &target, None).await {
                Ok(()) => reached += 1,
                Err(e) => tracing::warn!(
                    recipient = %sub.recipient_id(),
                    error = %e,
                    "Failed to push job summary"
                ),
            }
        }
        Ok(reached)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rover_common::AppError;
    use rover_db::entities::subscription;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use serde_json::Value;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Outbox(Mutex<Vec<BroadcastTarget>>);

    #[async_trait]
    impl MessageSender for Outbox {
        async fn send(
            &self,
            _message: &OutboundMessage,
            target: &BroadcastTarget,
            _extra: Option<&Value>,
        ) -> AppResult<()> {
            if target.recipient_id == "blocked" {
                return Err(AppError::Delivery("blocked".into()));
            }
            self.0.lock().unwrap().push(target.clone());
            Ok(())
        }
    }

    fn sub(id: &str, kind: SubscriptionChannel, user_id: &str, group_id: Option<&str>) -> subscription::Model {
        subscription::Model {
            id: id.into(),
            task_name: SIGN_RESULT_TASK.into(),
            channel_kind: kind,
            user_id: user_id.into(),
            group_id: group_id.map(str::to_string),
            bot_id: "onebot".into(),
            bot_self_id: "10001".into(),
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_notify_all_subscribers() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[
                    sub("s1", SubscriptionChannel::Direct, "admin", None),
                    sub("s2", SubscriptionChannel::Group, "admin", Some("g1")),
                    sub("s3", SubscriptionChannel::Direct, "blocked", None),
                ]])
                .into_connection(),
        );
        let outbox = Arc::new(Outbox::default());
        let notifier = SubscriptionNotifier::new(
            SIGN_RESULT_TASK,
            SubscriptionRepository::new(db),
            outbox.clone(),
        );

        let reached = notifier.notify("done: 10/10").await.unwrap();

        assert_eq!(reached, 2);
        let sent = outbox.0.lock().unwrap();
        assert_eq!(sent[0].channel_kind, ChannelKind::Direct);
        assert_eq!(sent[1].recipient_id, "g1");
        assert_eq!(sent[1].bot_self_id, "10001");
    }
}
