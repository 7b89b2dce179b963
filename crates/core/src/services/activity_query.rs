//! Read side of user activity.
//!
//! Storage corruption on these paths is logged and read as "no data" so a
//! damaged activity table never breaks the commands that consult it.

use chrono::{DateTime, Duration, Utc};
use rover_common::AppResult;
use rover_db::repositories::{ActivityKey, UserActivityRepository};

/// Activity lookups over a fixed window.
#[derive(Clone)]
pub struct ActivityQueryService {
    repo: UserActivityRepository,
    active_days: u32,
}

impl ActivityQueryService {
    #[must_use]
    pub const fn new(repo: UserActivityRepository, active_days: u32) -> Self {
        Self { repo, active_days }
    }

    pub async fn last_active_at(&self, key: &ActivityKey) -> AppResult<Option<DateTime<Utc>>> {
        degrade(self.repo.last_active_at(key).await, None)
    }

    /// Keys active within the window.
    pub async fn active_user_count(&self) -> AppResult<u64> {
        let threshold = Utc::now() - Duration::days(i64::from(self.active_days));
        degrade(self.repo.count_active_since(threshold).await, 0)
    }

    pub async fn is_user_active(&self, key: &ActivityKey) -> AppResult<bool> {
        degrade(self.repo.is_active(key, self.active_days).await, false)
    }
}

fn degrade<T>(result: AppResult<T>, fallback: T) -> AppResult<T> {
    match result {
        Err(e) if e.is_storage_corruption() => {
            tracing::error!(error = %e, "Activity table unreadable, treating as empty");
            Ok(fallback)
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rover_common::AppError;
    use rover_db::entities::user_activity;
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase};
    use std::sync::Arc;

    fn service(db: MockDatabase) -> ActivityQueryService {
        ActivityQueryService::new(UserActivityRepository::new(Arc::new(db.into_connection())), 30)
    }

    fn key() -> ActivityKey {
        ActivityKey::new("u1", "onebot", "10001")
    }

    #[tokio::test]
    async fn test_active_user() {
        let row = user_activity::Model {
            id: "a1".into(),
            user_id: "u1".into(),
            bot_id: "onebot".into(),
            bot_self_id: "10001".into(),
            last_active_at: Utc::now().into(),
        };
        let svc = service(MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[row]]));

        assert!(svc.is_user_active(&key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_corruption_reads_as_empty() {
        let svc = service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_errors([DbErr::Custom("database disk image is malformed".into())])
                .append_query_errors([DbErr::Custom("database disk image is malformed".into())]),
        );

        assert!(!svc.is_user_active(&key()).await.unwrap());
        assert!(svc.last_active_at(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_other_errors_propagate() {
        let svc = service(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_errors([DbErr::Custom("connection refused".into())]),
        );

        assert!(matches!(
            svc.active_user_count().await,
            Err(AppError::Database(_))
        ));
    }
}
