//! Group binding entity (which bot account delivers to a group).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rover_group_binding")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub group_id: String,

    /// Bot account currently responsible for the group
    pub bot_self_id: String,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
