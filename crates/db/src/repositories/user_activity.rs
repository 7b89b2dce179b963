//! User activity repository.

use std::sync::Arc;

use crate::entities::{UserActivity, user_activity};
use chrono::{DateTime, Duration, Utc};
use rover_common::{AppError, AppResult, IdGenerator};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set,
    sea_query::OnConflict,
};

/// Composite key of one activity row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActivityKey {
    pub user_id: String,
    pub bot_id: String,
    pub bot_self_id: String,
}

impl ActivityKey {
    pub fn new(
        user_id: impl Into<String>,
        bot_id: impl Into<String>,
        bot_self_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            bot_id: bot_id.into(),
            bot_self_id: bot_self_id.into(),
        }
    }
}

/// User activity repository for database operations.
#[derive(Clone)]
pub struct UserActivityRepository {
    db: Arc<DatabaseConnection>,
    id_gen: IdGenerator,
}

impl UserActivityRepository {
    /// Create a new user activity repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            id_gen: IdGenerator::new(),
        }
    }

    /// Insert or refresh the last-active time of a key in one statement.
    pub async fn upsert(&self, key: &ActivityKey, at: DateTime<Utc>) -> AppResult<()> {
        let model = user_activity::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(key.user_id.clone()),
            bot_id: Set(key.bot_id.clone()),
            bot_self_id: Set(key.bot_self_id.clone()),
            last_active_at: Set(at.fixed_offset()),
        };

        UserActivity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    user_activity::Column::UserId,
                    user_activity::Column::BotId,
                    user_activity::Column::BotSelfId,
                ])
                .update_column(user_activity::Column::LastActiveAt)
                .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// Last time the key was seen active.
    pub async fn last_active_at(&self, key: &ActivityKey) -> AppResult<Option<DateTime<Utc>>> {
        let row = UserActivity::find()
            .filter(user_activity::Column::UserId.eq(&key.user_id))
            .filter(user_activity::Column::BotId.eq(&key.bot_id))
            .filter(user_activity::Column::BotSelfId.eq(&key.bot_self_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(|m| m.last_active_at.with_timezone(&Utc)))
    }

    /// Number of activity rows touched at or after `threshold`.
    pub async fn count_active_since(&self, threshold: DateTime<Utc>) -> AppResult<u64> {
        UserActivity::find()
            .filter(user_activity::Column::LastActiveAt.gte(threshold.fixed_offset()))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Whether the key acted within the last `active_days` days.
    pub async fn is_active(&self, key: &ActivityKey, active_days: u32) -> AppResult<bool> {
        let threshold = Utc::now() - Duration::days(i64::from(active_days));
        Ok(self
            .last_active_at(key)
            .await?
            .is_some_and(|at| at >= threshold))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_activity(user_id: &str, at: DateTime<Utc>) -> user_activity::Model {
        user_activity::Model {
            id: format!("act-{user_id}"),
            user_id: user_id.to_string(),
            bot_id: "onebot".to_string(),
            bot_self_id: "10001".to_string(),
            last_active_at: at.fixed_offset(),
        }
    }

    fn key(user_id: &str) -> ActivityKey {
        ActivityKey::new(user_id, "onebot", "10001")
    }

    #[tokio::test]
    async fn test_upsert() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = UserActivityRepository::new(db);
        assert!(repo.upsert(&key("u1"), Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_last_active_at() {
        let at = Utc::now() - Duration::hours(3);
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_activity("u1", at)]])
                .into_connection(),
        );

        let repo = UserActivityRepository::new(db);
        let result = repo.last_active_at(&key("u1")).await.unwrap();

        assert_eq!(result.unwrap().timestamp(), at.timestamp());
    }

    #[tokio::test]
    async fn test_count_active_since() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(4))
                }]])
                .into_connection(),
        );

        let repo = UserActivityRepository::new(db);
        let count = repo
            .count_active_since(Utc::now() - Duration::days(30))
            .await
            .unwrap();

        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_is_active_window() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_activity("u1", Utc::now() - Duration::days(2))]])
                .append_query_results([[create_test_activity("u2", Utc::now() - Duration::days(40))]])
                .append_query_results([Vec::<user_activity::Model>::new()])
                .into_connection(),
        );

        let repo = UserActivityRepository::new(db);
        assert!(repo.is_active(&key("u1"), 30).await.unwrap());
        assert!(!repo.is_active(&key("u2"), 30).await.unwrap());
        assert!(!repo.is_active(&key("u3"), 30).await.unwrap());
    }
}
