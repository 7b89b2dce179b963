//! Routing resolution: which bot account delivers to a recipient.

use async_trait::async_trait;
use rover_common::AppResult;
use rover_db::repositories::{GroupBindingRepository, SubscriptionRepository};

use super::messaging::ChannelKind;

/// Looks up an explicit stored binding for a recipient.
#[async_trait]
pub trait BindingResolver: Send + Sync {
    /// Bot account bound to the recipient, if a binding is stored.
    async fn resolve(
        &self,
        channel_kind: ChannelKind,
        recipient_id: &str,
        origin_bot_id: &str,
    ) -> AppResult<Option<String>>;
}

/// Resolves direct recipients from their subscription row and groups from
/// the group binding table.
#[derive(Clone)]
pub struct StoredBindingResolver {
    task_name: String,
    subscriptions: SubscriptionRepository,
    groups: GroupBindingRepository,
}

impl StoredBindingResolver {
    pub fn new(
        task_name: impl Into<String>,
        subscriptions: SubscriptionRepository,
        groups: GroupBindingRepository,
    ) -> Self {
        Self {
            task_name: task_name.into(),
            subscriptions,
            groups,
        }
    }
}

#[async_trait]
impl BindingResolver for StoredBindingResolver {
    async fn resolve(
        &self,
        channel_kind: ChannelKind,
        recipient_id: &str,
        origin_bot_id: &str,
    ) -> AppResult<Option<String>> {
        match channel_kind {
            ChannelKind::Direct => {
                self.subscriptions
                    .find_direct_bot_self_id(&self.task_name, recipient_id, origin_bot_id)
                    .await
            }
            ChannelKind::Group => self.groups.find_bot(recipient_id).await,
        }
    }
}
