use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::status::ReservationStatus;

/// Waitlist ticket for one item and one card.
///
/// Once assigned it is bound to `instance_id` and carries a pickup window and
/// a hard expiry.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reservation_queue")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub request_id: i32,
    pub card_id: i32,
    pub item_id: i32,
    pub status: ReservationStatus,
    pub reserved_at: DateTimeUtc,
    pub instance_id: Option<i32>,
    pub assigned_at: Option<DateTimeUtc>,
    pub pickup_from: Option<DateTimeUtc>,
    pub pickup_until: Option<DateTimeUtc>,
    pub expires_at: Option<DateTimeUtc>,
    pub closed_at: Option<DateTimeUtc>,
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
