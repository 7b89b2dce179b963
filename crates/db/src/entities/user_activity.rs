//! User activity entity (last time a user acted, per bot identity).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rover_user_activity")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Platform user id
    pub user_id: String,

    /// Adapter id of the bot platform (e.g. `onebot`)
    pub bot_id: String,

    /// Account id of the bot that saw the activity
    pub bot_self_id: String,

    pub last_active_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
