//! Subscription entity (who receives which broadcast task).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Channel a subscription delivers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum SubscriptionChannel {
    #[sea_orm(string_value = "direct")]
    Direct,
    #[sea_orm(string_value = "group")]
    Group,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rover_subscription")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Broadcast task name, e.g. `sign_result`
    pub task_name: String,

    pub channel_kind: SubscriptionChannel,

    pub user_id: String,

    /// Group id for group subscriptions
    #[sea_orm(nullable)]
    pub group_id: Option<String>,

    pub bot_id: String,

    pub bot_self_id: String,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Recipient id the subscription delivers to.
    #[must_use]
    pub fn recipient_id(&self) -> &str {
        match (self.channel_kind, self.group_id.as_deref()) {
            (SubscriptionChannel::Group, Some(group_id)) => group_id,
            _ => &self.user_id,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
