//! Daily sign-in record entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rover_sign_record")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Game account uid
    pub uid: String,

    #[sea_orm(nullable)]
    pub pgr_uid: Option<String>,

    /// Day the record belongs to, `YYYY-MM-DD`
    pub date: String,

    pub game_sign: i32,
    pub pgr_game_sign: i32,
    pub bbs_sign: i32,
    pub bbs_detail: i32,
    pub bbs_like: i32,
    pub bbs_share: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
