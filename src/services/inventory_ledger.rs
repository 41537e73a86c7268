//! Inventory Ledger - per-item unit counters
//!
//! Every move is a single guarded `UPDATE` that only matches while the source
//! bucket is positive, so two racing callers can never drive a counter below
//! zero: the loser sees zero affected rows and gets a capacity error. The
//! ledger holds no locks and always runs on the caller's transaction.

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter};
use std::fmt;

use crate::domain::{IssueCode, LendingError, Locale};
use crate::models::inventory::{self, Entity as Inventory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Available,
    Requested,
    Reserved,
    Borrowed,
    Lost,
    Queued,
}

impl Bucket {
    fn column(self) -> inventory::Column {
        match self {
            Bucket::Available => inventory::Column::Available,
            Bucket::Requested => inventory::Column::Requested,
            Bucket::Reserved => inventory::Column::Reserved,
            Bucket::Borrowed => inventory::Column::Borrowed,
            Bucket::Lost => inventory::Column::Lost,
            Bucket::Queued => inventory::Column::Queued,
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Bucket::Available => "available",
            Bucket::Requested => "requested",
            Bucket::Reserved => "reserved",
            Bucket::Borrowed => "borrowed",
            Bucket::Lost => "lost",
            Bucket::Queued => "queued",
        };
        f.write_str(name)
    }
}

/// Which holding bucket a unit is parked in before it is borrowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldKind {
    /// Held for a request line.
    Requested,
    /// Held for an assigned reservation.
    Reserved,
}

impl HoldKind {
    fn bucket(self) -> Bucket {
        match self {
            HoldKind::Requested => Bucket::Requested,
            HoldKind::Reserved => Bucket::Reserved,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("item {item_id} has no {bucket} unit left")]
    Capacity { item_id: i32, bucket: Bucket },
    #[error("no inventory counters for item {0}")]
    Missing(i32),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl LedgerError {
    pub fn localize(self, locale: Locale) -> LendingError {
        match self {
            LedgerError::Capacity { .. } => {
                LendingError::conflict(IssueCode::CapacityExhausted, locale)
            }
            LedgerError::Missing(item_id) => LendingError::not_found("inventory", item_id),
            LedgerError::Database(e) => LendingError::from(e),
        }
    }
}

/// available → requested | reserved
pub async fn reserve<C: ConnectionTrait>(
    conn: &C,
    item_id: i32,
    kind: HoldKind,
) -> Result<(), LedgerError> {
    shift(conn, item_id, Bucket::Available, Some(kind.bucket())).await
}

/// requested | reserved → available
pub async fn release<C: ConnectionTrait>(
    conn: &C,
    item_id: i32,
    kind: HoldKind,
) -> Result<(), LedgerError> {
    shift(conn, item_id, kind.bucket(), Some(Bucket::Available)).await
}

/// requested | reserved → borrowed
pub async fn commit<C: ConnectionTrait>(
    conn: &C,
    item_id: i32,
    kind: HoldKind,
) -> Result<(), LedgerError> {
    shift(conn, item_id, kind.bucket(), Some(Bucket::Borrowed)).await
}

/// borrowed → available
pub async fn return_unit<C: ConnectionTrait>(conn: &C, item_id: i32) -> Result<(), LedgerError> {
    shift(conn, item_id, Bucket::Borrowed, Some(Bucket::Available)).await
}

/// borrowed → lost
pub async fn mark_lost<C: ConnectionTrait>(conn: &C, item_id: i32) -> Result<(), LedgerError> {
    shift(conn, item_id, Bucket::Borrowed, Some(Bucket::Lost)).await
}

/// One more patron waiting on the item.
pub async fn enqueue<C: ConnectionTrait>(conn: &C, item_id: i32) -> Result<(), LedgerError> {
    let result = Inventory::update_many()
        .col_expr(
            inventory::Column::Queued,
            Expr::col(inventory::Column::Queued).add(1),
        )
        .col_expr(
            inventory::Column::Version,
            Expr::col(inventory::Column::Version).add(1),
        )
        .filter(inventory::Column::ItemId.eq(item_id))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(LedgerError::Missing(item_id));
    }
    Ok(())
}

/// One patron fewer waiting on the item.
pub async fn dequeue<C: ConnectionTrait>(conn: &C, item_id: i32) -> Result<(), LedgerError> {
    shift(conn, item_id, Bucket::Queued, None).await
}

pub async fn snapshot<C: ConnectionTrait>(
    conn: &C,
    item_id: i32,
) -> Result<inventory::Model, LedgerError> {
    Inventory::find_by_id(item_id)
        .one(conn)
        .await?
        .ok_or(LedgerError::Missing(item_id))
}

async fn shift<C: ConnectionTrait>(
    conn: &C,
    item_id: i32,
    from: Bucket,
    to: Option<Bucket>,
) -> Result<(), LedgerError> {
    let mut update = Inventory::update_many()
        .col_expr(from.column(), Expr::col(from.column()).sub(1))
        .col_expr(
            inventory::Column::Version,
            Expr::col(inventory::Column::Version).add(1),
        );
    if let Some(to) = to {
        update = update.col_expr(to.column(), Expr::col(to.column()).add(1));
    }
    let result = update
        .filter(inventory::Column::ItemId.eq(item_id))
        .filter(from.column().gt(0))
        .exec(conn)
        .await?;

    if result.rows_affected == 1 {
        tracing::debug!(item_id, %from, to = ?to, "inventory unit moved");
        return Ok(());
    }

    // Tell an unknown item apart from an empty bucket.
    snapshot(conn, item_id).await?;
    tracing::warn!(item_id, bucket = %from, "inventory bucket exhausted");
    Err(LedgerError::Capacity {
        item_id,
        bucket: from,
    })
}
