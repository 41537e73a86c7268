use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::status::DetailStatus;

/// One copy's loan inside a borrow record.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "record_details")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub record_id: i32,
    pub card_id: i32,
    pub instance_id: i32,
    pub item_id: i32,
    pub status: DetailStatus,
    /// NULL for in-library loans.
    pub due_date: Option<DateTimeUtc>,
    pub return_date: Option<DateTimeUtc>,
    pub condition_before: String,
    pub condition_after: Option<String>,
    pub extension_count: i32,
    /// Set once the line has been extended while someone waited on the item.
    pub reservation_extension_used: bool,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::borrow_record::Entity",
        from = "Column::RecordId",
        to = "super::borrow_record::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    BorrowRecord,
    #[sea_orm(has_many = "super::extension::Entity")]
    Extension,
    #[sea_orm(has_many = "super::fine::Entity")]
    Fine,
}

impl Related<super::borrow_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BorrowRecord.def()
    }
}

impl Related<super::extension::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Extension.def()
    }
}

impl Related<super::fine::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Fine.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
