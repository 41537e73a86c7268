use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One requested item; holds a `requested` unit until converted or cancelled.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "request_lines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub request_id: i32,
    pub item_id: i32,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::borrow_request::Entity",
        from = "Column::RequestId",
        to = "super::borrow_request::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    BorrowRequest,
}

impl Related<super::borrow_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BorrowRequest.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
