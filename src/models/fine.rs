use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::status::{ConditionType, FineStatus};

/// A charge created at return or loss time. Settlement happens elsewhere.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub detail_id: i32,
    pub card_id: i32,
    pub policy_id: i32,
    pub condition_type: ConditionType,
    pub amount_cents: i64,
    pub status: FineStatus,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::record_detail::Entity",
        from = "Column::DetailId",
        to = "super::record_detail::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    RecordDetail,
}

impl Related<super::record_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RecordDetail.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
