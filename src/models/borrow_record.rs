use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::status::{BorrowType, RecordOrigin};

/// A realized loan event.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "borrow_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub card_id: i32,
    pub request_id: Option<i32>,
    pub borrow_type: BorrowType,
    pub origin: RecordOrigin,
    pub borrowed_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::record_detail::Entity")]
    RecordDetail,
}

impl Related<super::record_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RecordDetail.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
