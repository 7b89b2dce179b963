//! Group binding repository.

use std::sync::Arc;

use crate::entities::{GroupBinding, group_binding};
use chrono::Utc;
use rover_common::{AppError, AppResult};
use sea_orm::{DatabaseConnection, EntityTrait, Set, sea_query::OnConflict};

/// Stores which bot account controls each group.
#[derive(Clone)]
pub struct GroupBindingRepository {
    db: Arc<DatabaseConnection>,
}

impl GroupBindingRepository {
    /// Create a new group binding repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Bot account bound to a group, if any.
    pub async fn find_bot(&self, group_id: &str) -> AppResult<Option<String>> {
        let binding = GroupBinding::find_by_id(group_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(binding
            .map(|b| b.bot_self_id)
            .filter(|bot_self_id| !bot_self_id.is_empty()))
    }

    /// Bind a group to a bot account, replacing any previous binding.
    pub async fn bind(&self, group_id: &str, bot_self_id: &str) -> AppResult<()> {
        let model = group_binding::ActiveModel {
            group_id: Set(group_id.to_string()),
            bot_self_id: Set(bot_self_id.to_string()),
            updated_at: Set(Utc::now().fixed_offset()),
        };

        GroupBinding::insert(model)
            .on_conflict(
                OnConflict::column(group_binding::Column::GroupId)
                    .update_columns([
                        group_binding::Column::BotSelfId,
                        group_binding::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }
}
