//! Patron-facing read models.

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::collections::HashMap;

use crate::models::status::{
    BorrowType, DetailStatus, FineStatus, RequestStatus, ReservationStatus,
};
use crate::models::{borrow_request, fine, item, record_detail, request_line, reservation, resource_line};

#[derive(Debug, Clone, Serialize)]
pub struct ActiveLoan {
    pub detail_id: i32,
    pub record_id: i32,
    pub instance_id: i32,
    pub item_id: i32,
    pub title: String,
    pub status: DetailStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub extension_count: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaitlistPosition {
    pub reservation_id: i32,
    pub item_id: i32,
    pub status: ReservationStatus,
    pub pickup_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingRequest {
    pub request_id: i32,
    pub borrow_type: BorrowType,
    pub created_at: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub item_ids: Vec<i32>,
    pub resource_ids: Vec<i32>,
    pub reservations: Vec<WaitlistPosition>,
}

/// Counts over a card's whole history plus its unpaid balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivitySummary {
    /// Lines waiting in open requests.
    pub requested: u64,
    /// Lines currently out, overdue included.
    pub borrowed: u64,
    pub returned: u64,
    /// Active waitlist entries.
    pub reserved: u64,
    pub unpaid_fees_cents: i64,
}

pub async fn get_active_loans<C: ConnectionTrait>(
    conn: &C,
    card_id: i32,
) -> Result<Vec<ActiveLoan>, DbErr> {
    let details = record_detail::Entity::find()
        .filter(record_detail::Column::CardId.eq(card_id))
        .filter(record_detail::Column::Status.is_in([DetailStatus::Borrowing, DetailStatus::Overdue]))
        .order_by_asc(record_detail::Column::DueDate)
        .order_by_asc(record_detail::Column::Id)
        .all(conn)
        .await?;
    if details.is_empty() {
        return Ok(Vec::new());
    }

    let titles: HashMap<i32, String> = item::Entity::find()
        .filter(item::Column::Id.is_in(details.iter().map(|d| d.item_id).collect::<Vec<_>>()))
        .all(conn)
        .await?
        .into_iter()
        .map(|i| (i.id, i.title))
        .collect();

    Ok(details
        .into_iter()
        .map(|d| ActiveLoan {
            detail_id: d.id,
            record_id: d.record_id,
            instance_id: d.instance_id,
            item_id: d.item_id,
            title: titles.get(&d.item_id).cloned().unwrap_or_default(),
            status: d.status,
            due_date: d.due_date,
            extension_count: d.extension_count,
        })
        .collect())
}

pub async fn get_pending_requests<C: ConnectionTrait>(
    conn: &C,
    card_id: i32,
) -> Result<Vec<PendingRequest>, DbErr> {
    let requests = borrow_request::Entity::find()
        .filter(borrow_request::Column::CardId.eq(card_id))
        .filter(borrow_request::Column::Status.eq(RequestStatus::Created))
        .order_by_desc(borrow_request::Column::CreatedAt)
        .all(conn)
        .await?;

    let mut pending = Vec::with_capacity(requests.len());
    for request in requests {
        let item_ids = request_line::Entity::find()
            .filter(request_line::Column::RequestId.eq(request.id))
            .order_by_asc(request_line::Column::Id)
            .all(conn)
            .await?
            .into_iter()
            .map(|l| l.item_id)
            .collect();
        let resource_ids = resource_line::Entity::find()
            .filter(resource_line::Column::RequestId.eq(request.id))
            .order_by_asc(resource_line::Column::Id)
            .all(conn)
            .await?
            .into_iter()
            .map(|l| l.resource_id)
            .collect();
        let reservations = reservation::Entity::find()
            .filter(reservation::Column::RequestId.eq(request.id))
            .filter(
                reservation::Column::Status
                    .is_in([ReservationStatus::Pending, ReservationStatus::Assigned]),
            )
            .order_by_asc(reservation::Column::Id)
            .all(conn)
            .await?
            .into_iter()
            .map(|e| WaitlistPosition {
                reservation_id: e.id,
                item_id: e.item_id,
                status: e.status,
                pickup_until: e.pickup_until,
            })
            .collect();

        pending.push(PendingRequest {
            request_id: request.id,
            borrow_type: request.borrow_type,
            created_at: request.created_at,
            expiration_date: request.expiration_date,
            item_ids,
            resource_ids,
            reservations,
        });
    }
    Ok(pending)
}

pub async fn calculate_activity_summary<C: ConnectionTrait>(
    conn: &C,
    card_id: i32,
) -> Result<ActivitySummary, DbErr> {
    let open_requests: Vec<i32> = borrow_request::Entity::find()
        .filter(borrow_request::Column::CardId.eq(card_id))
        .filter(borrow_request::Column::Status.eq(RequestStatus::Created))
        .all(conn)
        .await?
        .into_iter()
        .map(|r| r.id)
        .collect();
    let requested = if open_requests.is_empty() {
        0
    } else {
        request_line::Entity::find()
            .filter(request_line::Column::RequestId.is_in(open_requests))
            .count(conn)
            .await?
    };

    let details = |statuses: Vec<DetailStatus>| {
        record_detail::Entity::find()
            .filter(record_detail::Column::CardId.eq(card_id))
            .filter(record_detail::Column::Status.is_in(statuses))
    };
    let borrowed = details(vec![DetailStatus::Borrowing, DetailStatus::Overdue])
        .count(conn)
        .await?;
    let returned = details(vec![DetailStatus::Returned]).count(conn).await?;

    let reserved = reservation::Entity::find()
        .filter(reservation::Column::CardId.eq(card_id))
        .filter(
            reservation::Column::Status
                .is_in([ReservationStatus::Pending, ReservationStatus::Assigned]),
        )
        .count(conn)
        .await?;

    let unpaid_fees_cents = fine::Entity::find()
        .filter(fine::Column::CardId.eq(card_id))
        .filter(fine::Column::Status.eq(FineStatus::Pending))
        .all(conn)
        .await?
        .iter()
        .map(|f| f.amount_cents)
        .sum();

    Ok(ActivitySummary {
        requested,
        borrowed,
        returned,
        reserved,
        unpaid_fees_cents,
    })
}
