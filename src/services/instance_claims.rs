//! Instance status changes and claim lookups
//!
//! A claim on a copy is an optimistic compare-and-set on its `version`: the
//! update only lands if nobody changed the row since it was read. Zero
//! affected rows means another caller won and this one gets a conflict.

use futures::try_join;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
};
use std::collections::{HashMap, HashSet};

use crate::domain::{IssueCode, LendingError, OpContext};
use crate::models::status::{DetailStatus, InstanceEvent, InstanceStatus, RequestStatus, ReservationStatus};
use crate::models::{
    borrow_request, condition_record, instance, record_detail, request_line, reservation,
};

/// Moves a copy to its next status if it is still at the version `current` was read at.
pub async fn transition<C: ConnectionTrait>(
    conn: &C,
    current: &instance::Model,
    event: InstanceEvent,
    ctx: &OpContext,
) -> Result<InstanceStatus, LendingError> {
    let next = current
        .status
        .apply(event)
        .map_err(|_| LendingError::conflict(IssueCode::ConcurrentModification, ctx.locale))?;

    let result = instance::Entity::update_many()
        .col_expr(instance::Column::Status, Expr::value(next))
        .col_expr(
            instance::Column::Version,
            Expr::col(instance::Column::Version).add(1),
        )
        .col_expr(instance::Column::UpdatedAt, Expr::value(ctx.now))
        .filter(instance::Column::Id.eq(current.id))
        .filter(instance::Column::Version.eq(current.version))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        tracing::warn!(instance_id = current.id, ?event, "lost race on instance");
        return Err(LendingError::conflict(
            IssueCode::ConcurrentModification,
            ctx.locale,
        ));
    }
    Ok(next)
}

/// Most recent recorded condition of a copy.
pub async fn latest_condition<C: ConnectionTrait>(
    conn: &C,
    instance_id: i32,
) -> Result<Option<String>, DbErr> {
    Ok(condition_record::Entity::find()
        .filter(condition_record::Column::InstanceId.eq(instance_id))
        .order_by_desc(condition_record::Column::RecordedAt)
        .order_by_desc(condition_record::Column::Id)
        .one(conn)
        .await?
        .map(|record| record.condition))
}

pub async fn load_instances<C: ConnectionTrait>(
    conn: &C,
    instance_ids: &[i32],
) -> Result<HashMap<i32, instance::Model>, DbErr> {
    if instance_ids.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(instance::Entity::find()
        .filter(instance::Column::Id.is_in(instance_ids.to_vec()))
        .all(conn)
        .await?
        .into_iter()
        .map(|i| (i.id, i))
        .collect())
}

/// Claims other parties already hold on a set of copies.
#[derive(Debug, Default)]
pub struct ClaimScan {
    /// Copies bound to an open loan line.
    pub on_loan: HashSet<i32>,
    /// Copy id → assigned reservation holding it.
    pub held: HashMap<i32, reservation::Model>,
    /// Items with open request lines from other cards.
    pub requested_by_others: HashSet<i32>,
}

/// Looks at loans, reservations and open requests at once, since any of the
/// three can hold a claim that blocks a walk-in or self-service checkout.
pub async fn scan_claims<C: ConnectionTrait>(
    conn: &C,
    card_id: i32,
    instance_ids: &[i32],
    item_ids: &[i32],
) -> Result<ClaimScan, DbErr> {
    let loans = async {
        record_detail::Entity::find()
            .filter(record_detail::Column::InstanceId.is_in(instance_ids.to_vec()))
            .filter(
                record_detail::Column::Status
                    .is_in([DetailStatus::Borrowing, DetailStatus::Overdue]),
            )
            .all(conn)
            .await
    };
    let holds = async {
        reservation::Entity::find()
            .filter(reservation::Column::InstanceId.is_in(instance_ids.to_vec()))
            .filter(reservation::Column::Status.eq(ReservationStatus::Assigned))
            .all(conn)
            .await
    };
    let requests = async {
        let lines = request_line::Entity::find()
            .filter(request_line::Column::ItemId.is_in(item_ids.to_vec()))
            .find_also_related(borrow_request::Entity)
            .all(conn)
            .await?;
        Ok::<_, DbErr>(
            lines
                .into_iter()
                .filter_map(|(line, request)| {
                    request
                        .filter(|r| r.status == RequestStatus::Created && r.card_id != card_id)
                        .map(|_| line.item_id)
                })
                .collect::<HashSet<i32>>(),
        )
    };

    let (loans, holds, requested_by_others) = try_join!(loans, holds, requests)?;

    Ok(ClaimScan {
        on_loan: loans.into_iter().map(|d| d.instance_id).collect(),
        held: holds
            .into_iter()
            .filter_map(|entry| entry.instance_id.map(|id| (id, entry)))
            .collect(),
        requested_by_others,
    })
}
