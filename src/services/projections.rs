//! Narrow read models, one query shape per consumer.
//!
//! Each function loads only the columns-worth of state its caller decides on,
//! so validation never drags a whole object graph into memory.

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter};
use std::collections::HashSet;

use crate::domain::IssueCode;
use crate::models::status::{CardStatus, DetailStatus, FineStatus, RequestStatus, ReservationStatus};
use crate::models::{
    borrow_record, borrow_request, card, fine, record_detail, request_line, reservation,
    resource_line,
};
use crate::services::policy::CardUsage;

/// What the engine needs to know about a card before letting it borrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardStanding {
    pub card_id: i32,
    pub active: bool,
    pub unpaid_fines: u64,
}

impl CardStanding {
    /// First reason the card may not borrow, if any.
    pub fn blocking_issue(&self) -> Option<IssueCode> {
        if !self.active {
            Some(IssueCode::CardInactive)
        } else if self.unpaid_fines > 0 {
            Some(IssueCode::CardHasUnpaidFines)
        } else {
            None
        }
    }
}

pub async fn card_standing<C: ConnectionTrait>(
    conn: &C,
    card_id: i32,
    now: DateTime<Utc>,
) -> Result<Option<CardStanding>, DbErr> {
    let Some(card) = card::Entity::find_by_id(card_id).one(conn).await? else {
        return Ok(None);
    };
    let active = card.status == CardStatus::Active && card.expires_at.is_none_or(|at| at > now);
    let unpaid_fines = fine::Entity::find()
        .filter(fine::Column::CardId.eq(card_id))
        .filter(fine::Column::Status.eq(FineStatus::Pending))
        .count(conn)
        .await?;
    Ok(Some(CardStanding {
        card_id,
        active,
        unpaid_fines,
    }))
}

/// Ids of the card's requests that are still open.
pub async fn open_request_ids<C: ConnectionTrait>(conn: &C, card_id: i32) -> Result<Vec<i32>, DbErr> {
    Ok(borrow_request::Entity::find()
        .filter(borrow_request::Column::CardId.eq(card_id))
        .filter(borrow_request::Column::Status.eq(RequestStatus::Created))
        .all(conn)
        .await?
        .into_iter()
        .map(|r| r.id)
        .collect())
}

pub async fn card_usage<C: ConnectionTrait>(conn: &C, card_id: i32) -> Result<CardUsage, DbErr> {
    let borrowed = record_detail::Entity::find()
        .filter(record_detail::Column::CardId.eq(card_id))
        .filter(record_detail::Column::Status.is_in([DetailStatus::Borrowing, DetailStatus::Overdue]))
        .count(conn)
        .await?;

    let open_requests = open_request_ids(conn, card_id).await?;
    let requested = if open_requests.is_empty() {
        0
    } else {
        request_line::Entity::find()
            .filter(request_line::Column::RequestId.is_in(open_requests))
            .count(conn)
            .await?
    };

    let queued = reservation::Entity::find()
        .filter(reservation::Column::CardId.eq(card_id))
        .filter(
            reservation::Column::Status
                .is_in([ReservationStatus::Pending, ReservationStatus::Assigned]),
        )
        .count(conn)
        .await?;

    Ok(CardUsage {
        borrowed: borrowed as i64,
        requested: requested as i64,
        queued: queued as i64,
    })
}

/// Items and resources a card holds an active claim on.
#[derive(Debug, Clone, Default)]
pub struct ActiveClaims {
    pub requested: HashSet<i32>,
    pub borrowed: HashSet<i32>,
    pub reserved: HashSet<i32>,
    pub resources: HashSet<i32>,
}

impl ActiveClaims {
    /// The single-active-claim rule for one card and one item.
    pub fn conflict_for(&self, item_id: i32) -> Option<IssueCode> {
        if self.borrowed.contains(&item_id) {
            Some(IssueCode::AlreadyBorrowed)
        } else if self.requested.contains(&item_id) {
            Some(IssueCode::AlreadyRequested)
        } else if self.reserved.contains(&item_id) {
            Some(IssueCode::AlreadyReserved)
        } else {
            None
        }
    }
}

pub async fn active_claims<C: ConnectionTrait>(conn: &C, card_id: i32) -> Result<ActiveClaims, DbErr> {
    let open_details = record_detail::Entity::find()
        .filter(record_detail::Column::CardId.eq(card_id))
        .filter(record_detail::Column::Status.is_in([DetailStatus::Borrowing, DetailStatus::Overdue]))
        .all(conn)
        .await?;
    let borrowed: HashSet<i32> = open_details.iter().map(|d| d.item_id).collect();

    let open_requests = open_request_ids(conn, card_id).await?;
    let requested: HashSet<i32> = if open_requests.is_empty() {
        HashSet::new()
    } else {
        request_line::Entity::find()
            .filter(request_line::Column::RequestId.is_in(open_requests.clone()))
            .all(conn)
            .await?
            .into_iter()
            .map(|line| line.item_id)
            .collect()
    };

    let reserved: HashSet<i32> = reservation::Entity::find()
        .filter(reservation::Column::CardId.eq(card_id))
        .filter(
            reservation::Column::Status
                .is_in([ReservationStatus::Pending, ReservationStatus::Assigned]),
        )
        .all(conn)
        .await?
        .into_iter()
        .map(|entry| entry.item_id)
        .collect();

    // Digital resources stay active while the request is open, or while the
    // loan it turned into still has an open line.
    let mut resource_requests = open_requests;
    let open_record_ids: HashSet<i32> = open_details.iter().map(|d| d.record_id).collect();
    if !open_record_ids.is_empty() {
        let fulfilled = borrow_record::Entity::find()
            .filter(borrow_record::Column::Id.is_in(open_record_ids))
            .all(conn)
            .await?;
        resource_requests.extend(fulfilled.into_iter().filter_map(|r| r.request_id));
    }
    let resources: HashSet<i32> = if resource_requests.is_empty() {
        HashSet::new()
    } else {
        resource_line::Entity::find()
            .filter(resource_line::Column::RequestId.is_in(resource_requests))
            .all(conn)
            .await?
            .into_iter()
            .map(|line| line.resource_id)
            .collect()
    };

    Ok(ActiveClaims {
        requested,
        borrowed,
        reserved,
        resources,
    })
}

/// Longest take-home period over a set of items, from their categories.
pub async fn longest_borrow_period<C: ConnectionTrait>(conn: &C, item_ids: &[i32]) -> Result<i32, DbErr> {
    use crate::models::{category, item};

    if item_ids.is_empty() {
        return Ok(0);
    }
    let items_with_category = item::Entity::find()
        .filter(item::Column::Id.is_in(item_ids.to_vec()))
        .find_also_related(category::Entity)
        .all(conn)
        .await?;
    Ok(items_with_category
        .into_iter()
        .filter_map(|(_, category)| category.map(|c| c.total_borrow_days))
        .max()
        .unwrap_or(0))
}
