use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-item unit counters.
///
/// `available + requested + reserved + borrowed + lost == total` at all times.
/// `queued` counts patrons waiting on the item and is not part of that sum.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_counters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub item_id: i32,
    pub total: i32,
    pub available: i32,
    pub requested: i32,
    pub reserved: i32,
    pub borrowed: i32,
    pub lost: i32,
    pub queued: i32,
    pub version: i32,
}

impl Model {
    pub fn is_balanced(&self) -> bool {
        self.available + self.requested + self.reserved + self.borrowed + self.lost == self.total
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::item::Entity",
        from = "Column::ItemId",
        to = "super::item::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Item,
}

impl Related<super::item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Item.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
