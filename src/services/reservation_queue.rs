//! Reservation Queue - FIFO waitlist per item
//!
//! Entries move Pending → Assigned → Collected, or end Expired/Cancelled.
//! Assignment binds a concrete copy and puts one unit aside
//! (available → reserved); releasing an assignment puts it back and hands the
//! copy to the next patron in line.

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::domain::{Issue, IssueCode, LendingError, OpContext, ReservationNotice};
use crate::models::instance;
use crate::models::reservation::{self, Entity as Reservation};
use crate::models::status::{InstanceEvent, InstanceStatus, ReservationEvent, ReservationStatus};
use crate::services::instance_claims;
use crate::services::inventory_ledger::{self as ledger, HoldKind};
use crate::services::policy::LendingPolicy;
use crate::services::projections;

/// Rejects a second active reservation, request line or loan for the same card and item.
pub async fn check_allow_to_reserve<C: ConnectionTrait>(
    conn: &C,
    card_id: i32,
    item_id: i32,
    ctx: &OpContext,
) -> Result<(), LendingError> {
    let claims = projections::active_claims(conn, card_id).await?;
    match claims.conflict_for(item_id) {
        Some(code) => Err(LendingError::conflict(code, ctx.locale)),
        None => Ok(()),
    }
}

/// Puts the card at the back of the item's waitlist.
pub async fn enqueue<C: ConnectionTrait>(
    conn: &C,
    request_id: i32,
    card_id: i32,
    item_id: i32,
    ctx: &OpContext,
) -> Result<reservation::Model, LendingError> {
    let entry = reservation::ActiveModel {
        request_id: Set(request_id),
        card_id: Set(card_id),
        item_id: Set(item_id),
        status: Set(ReservationStatus::Pending),
        reserved_at: Set(ctx.now),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    ledger::enqueue(conn, item_id)
        .await
        .map_err(|e| e.localize(ctx.locale))?;

    tracing::info!(reservation_id = entry.id, card_id, item_id, "patron queued");
    Ok(entry)
}

/// Hands a free copy of `item_id` to the oldest pending entry, if both exist.
///
/// `freed_instance` is tried first; otherwise any shelved copy not already set
/// aside is used.
pub async fn assign_next<C: ConnectionTrait>(
    conn: &C,
    item_id: i32,
    freed_instance: Option<i32>,
    policy: &LendingPolicy,
    ctx: &OpContext,
) -> Result<Option<ReservationNotice>, LendingError> {
    let Some(entry) = Reservation::find()
        .filter(reservation::Column::ItemId.eq(item_id))
        .filter(reservation::Column::Status.eq(ReservationStatus::Pending))
        .order_by_asc(reservation::Column::ReservedAt)
        .order_by_asc(reservation::Column::Id)
        .one(conn)
        .await?
    else {
        return Ok(None);
    };

    let counters = ledger::snapshot(conn, item_id)
        .await
        .map_err(|e| e.localize(ctx.locale))?;
    if counters.available == 0 {
        return Ok(None);
    }

    let mut candidates = instance::Entity::find()
        .filter(instance::Column::ItemId.eq(item_id))
        .filter(instance::Column::Status.is_in([InstanceStatus::InShelf, InstanceStatus::OutOfShelf]))
        .order_by_asc(instance::Column::Id)
        .all(conn)
        .await?;
    if let Some(freed) = freed_instance {
        candidates.sort_by_key(|c| c.id != freed);
    }
    let Some(copy) = candidates.into_iter().next() else {
        return Ok(None);
    };

    instance_claims::transition(conn, &copy, InstanceEvent::Hold, ctx).await?;
    ledger::reserve(conn, item_id, HoldKind::Reserved)
        .await
        .map_err(|e| e.localize(ctx.locale))?;
    ledger::dequeue(conn, item_id)
        .await
        .map_err(|e| e.localize(ctx.locale))?;

    let next = entry
        .status
        .apply(ReservationEvent::Assign)
        .map_err(|_| LendingError::state(IssueCode::ReservationClosed, ctx.locale))?;
    let window = policy.reservation_window(ctx.now);
    let result = Reservation::update_many()
        .col_expr(reservation::Column::Status, Expr::value(next))
        .col_expr(reservation::Column::InstanceId, Expr::value(copy.id))
        .col_expr(reservation::Column::AssignedAt, Expr::value(ctx.now))
        .col_expr(reservation::Column::PickupFrom, Expr::value(window.pickup_from))
        .col_expr(reservation::Column::PickupUntil, Expr::value(window.pickup_until))
        .col_expr(reservation::Column::ExpiresAt, Expr::value(window.expires_at))
        .filter(reservation::Column::Id.eq(entry.id))
        .filter(reservation::Column::Status.eq(ReservationStatus::Pending))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(LendingError::conflict(
            IssueCode::ConcurrentModification,
            ctx.locale,
        ));
    }

    tracing::info!(
        reservation_id = entry.id,
        card_id = entry.card_id,
        instance_id = copy.id,
        "reservation assigned"
    );
    Ok(Some(ReservationNotice {
        reservation_id: entry.id,
        card_id: entry.card_id,
        item_id,
        instance_id: copy.id,
        pickup_until: window.pickup_until,
        expires_at: window.expires_at,
    }))
}

/// Closes an entry as Expired or Cancelled, undoing whatever it held.
///
/// An assigned entry gives its copy back to the shelf and the next pending
/// entry is served; the notices for those follow-up assignments are returned.
pub async fn close<C: ConnectionTrait>(
    conn: &C,
    entry: &reservation::Model,
    event: ReservationEvent,
    policy: &LendingPolicy,
    ctx: &OpContext,
) -> Result<Option<ReservationNotice>, LendingError> {
    let next = entry
        .status
        .apply(event)
        .map_err(|_| LendingError::state(IssueCode::ReservationClosed, ctx.locale))?;
    set_status(conn, entry, next, ctx).await?;

    match entry.status {
        ReservationStatus::Pending => {
            ledger::dequeue(conn, entry.item_id)
                .await
                .map_err(|e| e.localize(ctx.locale))?;
            tracing::info!(reservation_id = entry.id, status = next.as_str(), "pending reservation closed");
            Ok(None)
        }
        ReservationStatus::Assigned => {
            let freed = match entry.instance_id {
                Some(instance_id) => {
                    let copy = instance::Entity::find_by_id(instance_id)
                        .one(conn)
                        .await?
                        .ok_or(LendingError::not_found("instance", instance_id))?;
                    instance_claims::transition(conn, &copy, InstanceEvent::ReleaseHold, ctx)
                        .await?;
                    Some(instance_id)
                }
                None => None,
            };
            ledger::release(conn, entry.item_id, HoldKind::Reserved)
                .await
                .map_err(|e| e.localize(ctx.locale))?;
            tracing::info!(reservation_id = entry.id, status = next.as_str(), "assigned reservation released");
            assign_next(conn, entry.item_id, freed, policy, ctx).await
        }
        ReservationStatus::Collected | ReservationStatus::Expired | ReservationStatus::Cancelled => {
            Err(LendingError::state(IssueCode::ReservationClosed, ctx.locale))
        }
    }
}

/// Marks an assigned entry collected and moves its unit reserved → borrowed.
///
/// The copy's own status change belongs to the checkout that collects it.
pub async fn collect<C: ConnectionTrait>(
    conn: &C,
    entry: &reservation::Model,
    ctx: &OpContext,
) -> Result<(), LendingError> {
    let next = entry
        .status
        .apply(ReservationEvent::Collect)
        .map_err(|_| LendingError::state(IssueCode::ReservationClosed, ctx.locale))?;
    set_status(conn, entry, next, ctx).await?;
    ledger::commit(conn, entry.item_id, HoldKind::Reserved)
        .await
        .map_err(|e| e.localize(ctx.locale))?;
    tracing::info!(reservation_id = entry.id, "reservation collected");
    Ok(())
}

/// Result of one expiry sweep.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ReservationSweep {
    pub expired: Vec<i32>,
    pub assigned: Vec<ReservationNotice>,
}

/// Expires assignments nobody picked up and cascades their copies down the queue.
pub async fn sweep_expired<C: ConnectionTrait>(
    conn: &C,
    policy: &LendingPolicy,
    ctx: &OpContext,
) -> Result<ReservationSweep, LendingError> {
    let stale: Vec<reservation::Model> = Reservation::find()
        .filter(reservation::Column::Status.eq(ReservationStatus::Assigned))
        .order_by_asc(reservation::Column::ExpiresAt)
        .all(conn)
        .await?
        .into_iter()
        .filter(|entry| entry.expires_at.is_some_and(|at| at <= ctx.now))
        .collect();

    let mut sweep = ReservationSweep::default();
    for entry in stale {
        let notice = close(conn, &entry, ReservationEvent::Expire, policy, ctx).await?;
        sweep.expired.push(entry.id);
        sweep.assigned.extend(notice);
    }
    if !sweep.expired.is_empty() {
        tracing::info!(expired = sweep.expired.len(), reassigned = sweep.assigned.len(), "reservation sweep done");
    }
    Ok(sweep)
}

/// Puts a returned copy back on the shelf and offers it to the waitlist.
pub async fn shelve_instance<C: ConnectionTrait>(
    conn: &C,
    instance_id: i32,
    policy: &LendingPolicy,
    ctx: &OpContext,
) -> Result<Option<ReservationNotice>, LendingError> {
    let copy = instance::Entity::find_by_id(instance_id)
        .one(conn)
        .await?
        .ok_or(LendingError::not_found("instance", instance_id))?;
    if copy.status != InstanceStatus::OutOfShelf {
        return Err(LendingError::Validation(vec![Issue::new(
            None,
            None,
            IssueCode::InstanceUnavailable,
            ctx.locale,
        )]));
    }
    instance_claims::transition(conn, &copy, InstanceEvent::Shelve, ctx).await?;
    assign_next(conn, copy.item_id, Some(instance_id), policy, ctx).await
}

async fn set_status<C: ConnectionTrait>(
    conn: &C,
    entry: &reservation::Model,
    next: ReservationStatus,
    ctx: &OpContext,
) -> Result<(), LendingError> {
    let result = Reservation::update_many()
        .col_expr(reservation::Column::Status, Expr::value(next))
        .col_expr(reservation::Column::ClosedAt, Expr::value(ctx.now))
        .filter(reservation::Column::Id.eq(entry.id))
        .filter(reservation::Column::Status.eq(entry.status))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(LendingError::conflict(
            IssueCode::ConcurrentModification,
            ctx.locale,
        ));
    }
    Ok(())
}
