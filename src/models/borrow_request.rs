use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::status::{BorrowType, RequestStatus};

/// A patron's pending intent to borrow or reserve.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "borrow_requests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub card_id: i32,
    pub status: RequestStatus,
    pub borrow_type: BorrowType,
    pub expiration_date: DateTimeUtc,
    pub version: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::request_line::Entity")]
    RequestLine,
    #[sea_orm(has_many = "super::resource_line::Entity")]
    ResourceLine,
    #[sea_orm(has_many = "super::reservation::Entity")]
    Reservation,
}

impl Related<super::request_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RequestLine.def()
    }
}

impl Related<super::resource_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ResourceLine.def()
    }
}

impl Related<super::reservation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reservation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
