//! Sign record repository.

use std::sync::Arc;

use crate::entities::{SignRecord, sign_record};
use rover_common::{AppError, AppResult};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

/// Per-day sign-in outcome rows.
#[derive(Clone)]
pub struct SignRecordRepository {
    db: Arc<DatabaseConnection>,
}

impl SignRecordRepository {
    /// Create a new sign record repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Record of one account on one day (`YYYY-MM-DD`).
    pub async fn find(&self, uid: &str, date: &str) -> AppResult<Option<sign_record::Model>> {
        SignRecord::find()
            .filter(sign_record::Column::Uid.eq(uid))
            .filter(sign_record::Column::Date.eq(date))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete every record dated on or before `date` (`YYYY-MM-DD`).
    pub async fn delete_through(&self, date: &str) -> AppResult<u64> {
        // ISO dates order lexically
        let result = SignRecord::delete_many()
            .filter(sign_record::Column::Date.lte(date))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }
}
