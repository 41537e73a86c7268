//! Catalog fixtures: categories, items with copies, cards and fine policies.
//!
//! Cataloguing itself is outside the lending core; these helpers write the
//! rows it expects, for the demo seed and for tests.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::*;

use crate::models::status::{CardStatus, ChargeKind, ConditionType, InstanceStatus};
use crate::models::{
    card, category, condition_record, digital_resource, fine_policy, instance, inventory, item,
};

/// An item with its copies, as created by [`create_item`].
#[derive(Debug, Clone)]
pub struct CatalogItem {
    pub item: item::Model,
    pub instances: Vec<instance::Model>,
}

impl CatalogItem {
    pub fn id(&self) -> i32 {
        self.item.id
    }

    pub fn instance_ids(&self) -> Vec<i32> {
        self.instances.iter().map(|i| i.id).collect()
    }
}

pub async fn create_category<C: ConnectionTrait>(
    db: &C,
    name: &str,
    total_borrow_days: i32,
) -> Result<category::Model, DbErr> {
    category::ActiveModel {
        name: Set(name.to_owned()),
        total_borrow_days: Set(total_borrow_days),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Item plus `copies` shelved copies in "good" condition.
pub async fn create_item<C: ConnectionTrait>(
    db: &C,
    category_id: i32,
    title: &str,
    estimated_price_cents: Option<i64>,
    copies: usize,
) -> Result<CatalogItem, DbErr> {
    let item = item::ActiveModel {
        title: Set(title.to_owned()),
        category_id: Set(category_id),
        estimated_price_cents: Set(estimated_price_cents),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    inventory::Entity::insert(inventory::ActiveModel {
        item_id: Set(item.id),
        total: Set(0),
        available: Set(0),
        requested: Set(0),
        reserved: Set(0),
        borrowed: Set(0),
        lost: Set(0),
        queued: Set(0),
        version: Set(0),
    })
    .exec_without_returning(db)
    .await?;

    let mut instances = Vec::with_capacity(copies);
    for _ in 0..copies {
        instances.push(add_copy(db, item.id, Some("good")).await?);
    }

    Ok(CatalogItem { item, instances })
}

/// Shelve one more copy of an item. `condition` of `None` leaves it without history.
pub async fn add_copy<C: ConnectionTrait>(
    db: &C,
    item_id: i32,
    condition: Option<&str>,
) -> Result<instance::Model, DbErr> {
    let existing = instance::Entity::find()
        .filter(instance::Column::ItemId.eq(item_id))
        .count(db)
        .await?;
    let copy = instance::ActiveModel {
        item_id: Set(item_id),
        barcode: Set(format!("{:05}-{:03}", item_id, existing + 1)),
        status: Set(InstanceStatus::InShelf),
        version: Set(0),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    if let Some(condition) = condition {
        record_condition(db, copy.id, condition).await?;
    }

    inventory::Entity::update_many()
        .col_expr(inventory::Column::Total, Expr::col(inventory::Column::Total).add(1))
        .col_expr(
            inventory::Column::Available,
            Expr::col(inventory::Column::Available).add(1),
        )
        .filter(inventory::Column::ItemId.eq(item_id))
        .exec(db)
        .await?;

    Ok(copy)
}

pub async fn record_condition<C: ConnectionTrait>(
    db: &C,
    instance_id: i32,
    condition: &str,
) -> Result<condition_record::Model, DbErr> {
    condition_record::ActiveModel {
        instance_id: Set(instance_id),
        condition: Set(condition.to_owned()),
        recorded_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn create_card<C: ConnectionTrait>(
    db: &C,
    patron_email: &str,
    holder_name: &str,
) -> Result<card::Model, DbErr> {
    card::ActiveModel {
        patron_email: Set(patron_email.trim().to_lowercase()),
        holder_name: Set(holder_name.to_owned()),
        status: Set(CardStatus::Active),
        expires_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn create_resource<C: ConnectionTrait>(
    db: &C,
    title: &str,
) -> Result<digital_resource::Model, DbErr> {
    digital_resource::ActiveModel {
        title: Set(title.to_owned()),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn create_fine_policy<C: ConnectionTrait>(
    db: &C,
    name: &str,
    condition_type: ConditionType,
    charge: ChargeKind,
    amount_cents: i64,
) -> Result<fine_policy::Model, DbErr> {
    fine_policy::ActiveModel {
        name: Set(name.to_owned()),
        condition_type: Set(condition_type),
        charge: Set(charge),
        amount_cents: Set(amount_cents),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn seed_demo_data(db: &DatabaseConnection) -> Result<(), DbErr> {
    if category::Entity::find().count(db).await? > 0 {
        tracing::info!("catalog already present, skipping seed");
        return Ok(());
    }

    let fiction = create_category(db, "Fiction", 21).await?;
    let reference = create_category(db, "Reference", 7).await?;

    create_item(db, fiction.id, "The Left Hand of Darkness", Some(1800), 2).await?;
    create_item(db, fiction.id, "Dune", Some(2200), 1).await?;
    create_item(db, reference.id, "Oxford Atlas of the World", Some(9500), 1).await?;
    create_resource(db, "Encyclopedia Online").await?;

    create_card(db, "ada@example.org", "Ada Lovelace").await?;
    create_card(db, "alan@example.org", "Alan Turing").await?;

    create_fine_policy(db, "Late return", ConditionType::Overdue, ChargeKind::DailyRate, 25).await?;
    create_fine_policy(db, "Lost item", ConditionType::Lost, ChargeKind::PriceRatio, 100).await?;
    create_fine_policy(db, "Damage", ConditionType::Damaged, ChargeKind::Fixed, 500).await?;

    tracing::info!("demo catalog seeded");
    Ok(())
}
