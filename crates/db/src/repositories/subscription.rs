//! Subscription repository.

use std::sync::Arc;

use crate::entities::{
    Subscription,
    subscription::{self, SubscriptionChannel},
};
use chrono::Utc;
use rover_common::{AppError, AppResult, IdGenerator};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

/// Subscription repository for database operations.
#[derive(Clone)]
pub struct SubscriptionRepository {
    db: Arc<DatabaseConnection>,
    id_gen: IdGenerator,
}

impl SubscriptionRepository {
    /// Create a new subscription repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            id_gen: IdGenerator::new(),
        }
    }

    /// All subscriptions of a task, oldest first.
    pub async fn find_by_task(&self, task_name: &str) -> AppResult<Vec<subscription::Model>> {
        Subscription::find()
            .filter(subscription::Column::TaskName.eq(task_name))
            .order_by_asc(subscription::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Subscribe a recipient to a task.
    pub async fn add(
        &self,
        task_name: &str,
        channel_kind: SubscriptionChannel,
        user_id: &str,
        group_id: Option<&str>,
        bot_id: &str,
        bot_self_id: &str,
    ) -> AppResult<subscription::Model> {
        let model = subscription::ActiveModel {
            id: Set(self.id_gen.generate()),
            task_name: Set(task_name.to_string()),
            channel_kind: Set(channel_kind),
            user_id: Set(user_id.to_string()),
            group_id: Set(group_id.map(str::to_string)),
            bot_id: Set(bot_id.to_string()),
            bot_self_id: Set(bot_self_id.to_string()),
            created_at: Set(Utc::now().fixed_offset()),
        };

        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Remove a user's subscriptions to a task. Returns the number of rows removed.
    pub async fn remove(&self, task_name: &str, user_id: &str, bot_id: &str) -> AppResult<u64> {
        let result = Subscription::delete_many()
            .filter(subscription::Column::TaskName.eq(task_name))
            .filter(subscription::Column::UserId.eq(user_id))
            .filter(subscription::Column::BotId.eq(bot_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Bot account recorded on a user's direct subscription.
    pub async fn find_direct_bot_self_id(
        &self,
        task_name: &str,
        user_id: &str,
        bot_id: &str,
    ) -> AppResult<Option<String>> {
        let row = Subscription::find()
            .filter(subscription::Column::TaskName.eq(task_name))
            .filter(subscription::Column::ChannelKind.eq(SubscriptionChannel::Direct))
            .filter(subscription::Column::UserId.eq(user_id))
            .filter(subscription::Column::BotId.eq(bot_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row
            .map(|m| m.bot_self_id)
            .filter(|bot_self_id| !bot_self_id.is_empty()))
    }
}
