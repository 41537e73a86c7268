//! Borrow Request Service - a patron's pending intent
//!
//! A request holds item lines (each parking one `requested` unit), digital
//! resource lines, and waitlist entries for items with no free copy. It can
//! only change while Created; every other status is terminal.

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::{Field, IssueCode, Issues, LendingError, OpContext, ReservationNotice};
use crate::models::borrow_request::{self, Entity as BorrowRequest};
use crate::models::status::{
    BorrowType, RequestEvent, RequestStatus, ReservationEvent, ReservationStatus,
};
use crate::models::{digital_resource, inventory, request_line, reservation, resource_line};
use crate::services::inventory_ledger::{self as ledger, HoldKind};
use crate::services::policy::LendingPolicy;
use crate::services::projections::{self, ActiveClaims};
use crate::services::reservation_queue;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRequest {
    pub card_id: i32,
    #[serde(default)]
    pub item_ids: Vec<i32>,
    #[serde(default)]
    pub resource_ids: Vec<i32>,
    /// Items the patron explicitly wants to queue for.
    #[serde(default)]
    pub reservation_item_ids: Vec<i32>,
    #[serde(default)]
    pub borrow_type: BorrowType,
}

/// A request with everything hanging off it.
#[derive(Debug, Clone, Serialize)]
pub struct RequestSummary {
    pub request: borrow_request::Model,
    pub lines: Vec<request_line::Model>,
    pub resources: Vec<resource_line::Model>,
    pub reservations: Vec<reservation::Model>,
    /// Copies handed to waiting patrons by this call.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assigned: Vec<ReservationNotice>,
}

/// Outcome of removing one line from a request.
#[derive(Debug, Clone, Serialize)]
pub struct LineRemoval {
    pub request_id: i32,
    /// The request had no line left and was deleted.
    pub request_deleted: bool,
    pub assigned: Vec<ReservationNotice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestClosure {
    pub request: borrow_request::Model,
    pub assigned: Vec<ReservationNotice>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RequestSweep {
    pub expired: Vec<i32>,
    pub assigned: Vec<ReservationNotice>,
}

/// Which line of a request to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RequestLineRef {
    Item(i32),
    Resource(i32),
    Reservation(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Planned {
    /// A copy is free: hold one unit for the request.
    Line(i32),
    /// Nothing free: join the waitlist.
    Queue(i32),
}

impl Planned {
    fn item_id(self) -> i32 {
        match self {
            Planned::Line(id) | Planned::Queue(id) => id,
        }
    }
}

/// Create a request; any rejected line rejects the whole call.
pub async fn create_request<C: ConnectionTrait>(
    conn: &C,
    policy: &LendingPolicy,
    ctx: &OpContext,
    input: NewRequest,
) -> Result<RequestSummary, LendingError> {
    let mut issues = Issues::new(ctx.locale);

    let standing = projections::card_standing(conn, input.card_id, ctx.now)
        .await?
        .ok_or(LendingError::not_found("card", input.card_id))?;
    if let Some(code) = standing.blocking_issue() {
        issues.general(code);
    }
    if input.item_ids.is_empty()
        && input.reservation_item_ids.is_empty()
        && input.resource_ids.is_empty()
    {
        issues.general(IssueCode::EmptyRequest);
    }

    let claims = projections::active_claims(conn, input.card_id).await?;
    let usage = projections::card_usage(conn, input.card_id).await?;
    let ceiling = policy.borrow_ceiling(&usage);

    let mut seen = HashSet::new();
    let mut planned: Vec<Planned> = Vec::new();
    for (field, ids, wants_loan) in [
        (Field::Items, &input.item_ids, true),
        (Field::Reservations, &input.reservation_item_ids, false),
    ] {
        for (idx, &item_id) in ids.iter().enumerate() {
            if !seen.insert(item_id) {
                issues.line(field, idx, IssueCode::DuplicateItem);
                continue;
            }
            let accepted = planned.len() as i64;
            match plan_item(conn, item_id, wants_loan, &claims, accepted, ceiling).await? {
                Ok(plan) => planned.push(plan),
                Err(code) => issues.line(field, idx, code),
            }
        }
    }

    let mut seen_resources = HashSet::new();
    for (idx, &resource_id) in input.resource_ids.iter().enumerate() {
        if !seen_resources.insert(resource_id) {
            issues.line(Field::Resources, idx, IssueCode::DuplicateResource);
        } else if let Some(code) = check_resource(conn, resource_id, &claims).await? {
            issues.line(Field::Resources, idx, code);
        }
    }

    if let Err(e) = issues.into_result() {
        tracing::warn!(card_id = input.card_id, error = %e, "request rejected");
        return Err(e);
    }

    let request = borrow_request::ActiveModel {
        card_id: Set(input.card_id),
        status: Set(RequestStatus::Created),
        borrow_type: Set(input.borrow_type),
        expiration_date: Set(policy.request_expiration(ctx.now)),
        version: Set(0),
        created_at: Set(ctx.now),
        updated_at: Set(ctx.now),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    let mut assigned = Vec::new();
    for plan in planned {
        assigned.extend(apply_plan(conn, &request, plan, policy, ctx).await?);
    }
    let mut inserted = HashSet::new();
    for &resource_id in &input.resource_ids {
        if inserted.insert(resource_id) {
            insert_resource_line(conn, request.id, resource_id).await?;
        }
    }

    tracing::info!(request_id = request.id, card_id = request.card_id, "request created");
    let mut summary = load_summary(conn, request.id).await?;
    summary.assigned = assigned;
    Ok(summary)
}

/// Add one item to an open request, with the same checks as creation.
pub async fn add_item<C: ConnectionTrait>(
    conn: &C,
    policy: &LendingPolicy,
    ctx: &OpContext,
    request_id: i32,
    item_id: i32,
) -> Result<RequestSummary, LendingError> {
    let request = ensure_open(conn, request_id, ctx).await?;
    let mut issues = Issues::new(ctx.locale);

    let standing = projections::card_standing(conn, request.card_id, ctx.now)
        .await?
        .ok_or(LendingError::not_found("card", request.card_id))?;
    if let Some(code) = standing.blocking_issue() {
        issues.general(code);
    }

    let claims = projections::active_claims(conn, request.card_id).await?;
    let usage = projections::card_usage(conn, request.card_id).await?;
    let ceiling = policy.borrow_ceiling(&usage);
    let plan = match plan_item(conn, item_id, true, &claims, 0, ceiling).await? {
        Ok(plan) => Some(plan),
        Err(code) => {
            issues.line(Field::Items, 0, code);
            None
        }
    };
    issues.into_result()?;

    touch(conn, &request, ctx).await?;
    let mut assigned = Vec::new();
    if let Some(plan) = plan {
        assigned.extend(apply_plan(conn, &request, plan, policy, ctx).await?);
    }
    tracing::info!(request_id, item_id, "item added to request");
    let mut summary = load_summary(conn, request_id).await?;
    summary.assigned = assigned;
    Ok(summary)
}

/// Add one digital resource to an open request.
pub async fn add_resource<C: ConnectionTrait>(
    conn: &C,
    ctx: &OpContext,
    request_id: i32,
    resource_id: i32,
) -> Result<RequestSummary, LendingError> {
    let request = ensure_open(conn, request_id, ctx).await?;
    let claims = projections::active_claims(conn, request.card_id).await?;
    let mut issues = Issues::new(ctx.locale);
    if let Some(code) = check_resource(conn, resource_id, &claims).await? {
        issues.line(Field::Resources, 0, code);
    }
    issues.into_result()?;

    touch(conn, &request, ctx).await?;
    insert_resource_line(conn, request_id, resource_id).await?;
    load_summary(conn, request_id).await
}

/// Cancel a whole request and hand back everything it held.
///
/// A second cancel finds a terminal request and fails without touching counters.
pub async fn cancel_request<C: ConnectionTrait>(
    conn: &C,
    policy: &LendingPolicy,
    ctx: &OpContext,
    request_id: i32,
) -> Result<RequestClosure, LendingError> {
    let request = BorrowRequest::find_by_id(request_id)
        .one(conn)
        .await?
        .ok_or(LendingError::not_found("request", request_id))?;
    let next = request
        .status
        .apply(RequestEvent::Cancel)
        .map_err(|_| LendingError::state(IssueCode::RequestNotMutable, ctx.locale))?;

    set_status(conn, &request, next, ctx).await?;
    let assigned = release_holdings(conn, &request, ReservationEvent::Cancel, policy, ctx).await?;

    tracing::info!(request_id, "request cancelled");
    let request = BorrowRequest::find_by_id(request_id)
        .one(conn)
        .await?
        .ok_or(LendingError::not_found("request", request_id))?;
    Ok(RequestClosure { request, assigned })
}

/// Remove one line; a request left with no line is deleted.
pub async fn cancel_line<C: ConnectionTrait>(
    conn: &C,
    policy: &LendingPolicy,
    ctx: &OpContext,
    request_id: i32,
    line: RequestLineRef,
) -> Result<LineRemoval, LendingError> {
    let request = ensure_open(conn, request_id, ctx).await?;
    let mut assigned = Vec::new();

    match line {
        RequestLineRef::Item(line_id) => {
            let line = request_line::Entity::find_by_id(line_id)
                .filter(request_line::Column::RequestId.eq(request_id))
                .one(conn)
                .await?
                .ok_or(LendingError::not_found("request line", line_id))?;
            ledger::release(conn, line.item_id, HoldKind::Requested)
                .await
                .map_err(|e| e.localize(ctx.locale))?;
            request_line::Entity::delete_by_id(line.id).exec(conn).await?;
            assigned.extend(
                reservation_queue::assign_next(conn, line.item_id, None, policy, ctx).await?,
            );
        }
        RequestLineRef::Resource(line_id) => {
            let line = resource_line::Entity::find_by_id(line_id)
                .filter(resource_line::Column::RequestId.eq(request_id))
                .one(conn)
                .await?
                .ok_or(LendingError::not_found("resource line", line_id))?;
            resource_line::Entity::delete_by_id(line.id).exec(conn).await?;
        }
        RequestLineRef::Reservation(entry_id) => {
            let entry = reservation::Entity::find_by_id(entry_id)
                .filter(reservation::Column::RequestId.eq(request_id))
                .one(conn)
                .await?
                .ok_or(LendingError::not_found("reservation", entry_id))?;
            assigned.extend(
                reservation_queue::close(conn, &entry, ReservationEvent::Cancel, policy, ctx)
                    .await?,
            );
        }
    }

    touch(conn, &request, ctx).await?;
    let request_deleted = prune_if_empty(conn, request_id).await?;
    tracing::info!(request_id, ?line, request_deleted, "request line cancelled");
    Ok(LineRemoval {
        request_id,
        request_deleted,
        assigned,
    })
}

/// Expire open requests whose expiration date has passed.
///
/// Pending waitlist entries lapse with their request. A request holding a copy
/// that is still inside its pickup window stays open until that window closes.
pub async fn expire_requests<C: ConnectionTrait>(
    conn: &C,
    policy: &LendingPolicy,
    ctx: &OpContext,
) -> Result<RequestSweep, LendingError> {
    let on_hold: HashSet<i32> = reservation::Entity::find()
        .filter(reservation::Column::Status.eq(ReservationStatus::Assigned))
        .all(conn)
        .await?
        .into_iter()
        .filter(|entry| entry.expires_at.is_some_and(|at| at > ctx.now))
        .map(|entry| entry.request_id)
        .collect();
    let due: Vec<borrow_request::Model> = BorrowRequest::find()
        .filter(borrow_request::Column::Status.eq(RequestStatus::Created))
        .order_by_asc(borrow_request::Column::Id)
        .all(conn)
        .await?
        .into_iter()
        .filter(|r| r.expiration_date <= ctx.now && !on_hold.contains(&r.id))
        .collect();

    let mut sweep = RequestSweep::default();
    for request in due {
        let next = request
            .status
            .apply(RequestEvent::Expire)
            .map_err(|_| LendingError::state(IssueCode::RequestNotMutable, ctx.locale))?;
        set_status(conn, &request, next, ctx).await?;
        sweep
            .assigned
            .extend(release_holdings(conn, &request, ReservationEvent::Expire, policy, ctx).await?);
        sweep.expired.push(request.id);
    }
    if !sweep.expired.is_empty() {
        tracing::info!(expired = sweep.expired.len(), "request sweep done");
    }
    Ok(sweep)
}

pub async fn load_summary<C: ConnectionTrait>(
    conn: &C,
    request_id: i32,
) -> Result<RequestSummary, LendingError> {
    let request = BorrowRequest::find_by_id(request_id)
        .one(conn)
        .await?
        .ok_or(LendingError::not_found("request", request_id))?;
    let lines = request_line::Entity::find()
        .filter(request_line::Column::RequestId.eq(request_id))
        .order_by_asc(request_line::Column::Id)
        .all(conn)
        .await?;
    let resources = resource_line::Entity::find()
        .filter(resource_line::Column::RequestId.eq(request_id))
        .order_by_asc(resource_line::Column::Id)
        .all(conn)
        .await?;
    let reservations = reservation::Entity::find()
        .filter(reservation::Column::RequestId.eq(request_id))
        .order_by_asc(reservation::Column::Id)
        .all(conn)
        .await?;
    Ok(RequestSummary {
        request,
        lines,
        resources,
        reservations,
        assigned: Vec::new(),
    })
}

/// Compare-and-set the request status, bumping its version.
pub(crate) async fn set_status<C: ConnectionTrait>(
    conn: &C,
    request: &borrow_request::Model,
    next: RequestStatus,
    ctx: &OpContext,
) -> Result<(), LendingError> {
    let result = BorrowRequest::update_many()
        .col_expr(borrow_request::Column::Status, Expr::value(next))
        .col_expr(
            borrow_request::Column::Version,
            Expr::col(borrow_request::Column::Version).add(1),
        )
        .col_expr(borrow_request::Column::UpdatedAt, Expr::value(ctx.now))
        .filter(borrow_request::Column::Id.eq(request.id))
        .filter(borrow_request::Column::Version.eq(request.version))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        tracing::warn!(request_id = request.id, "lost race on request");
        return Err(LendingError::conflict(
            IssueCode::ConcurrentModification,
            ctx.locale,
        ));
    }
    Ok(())
}

async fn ensure_open<C: ConnectionTrait>(
    conn: &C,
    request_id: i32,
    ctx: &OpContext,
) -> Result<borrow_request::Model, LendingError> {
    let request = BorrowRequest::find_by_id(request_id)
        .one(conn)
        .await?
        .ok_or(LendingError::not_found("request", request_id))?;
    request
        .status
        .apply(RequestEvent::Amend)
        .map_err(|_| LendingError::state(IssueCode::RequestNotMutable, ctx.locale))?;
    Ok(request)
}

/// Serializes amendments of one request against each other.
async fn touch<C: ConnectionTrait>(
    conn: &C,
    request: &borrow_request::Model,
    ctx: &OpContext,
) -> Result<(), LendingError> {
    set_status(conn, request, request.status, ctx).await
}

async fn plan_item<C: ConnectionTrait>(
    conn: &C,
    item_id: i32,
    wants_loan: bool,
    claims: &ActiveClaims,
    accepted: i64,
    ceiling: i64,
) -> Result<Result<Planned, IssueCode>, LendingError> {
    let Some(counters) = inventory::Entity::find_by_id(item_id).one(conn).await? else {
        return Ok(Err(IssueCode::ItemNotFound));
    };
    if let Some(code) = claims.conflict_for(item_id) {
        return Ok(Err(code));
    }
    if counters.total - counters.lost <= 0 {
        return Ok(Err(IssueCode::CapacityExhausted));
    }
    if accepted >= ceiling {
        return Ok(Err(IssueCode::BorrowLimitExceeded));
    }
    Ok(Ok(if wants_loan && counters.available > 0 {
        Planned::Line(item_id)
    } else {
        Planned::Queue(item_id)
    }))
}

async fn check_resource<C: ConnectionTrait>(
    conn: &C,
    resource_id: i32,
    claims: &ActiveClaims,
) -> Result<Option<IssueCode>, LendingError> {
    if digital_resource::Entity::find_by_id(resource_id)
        .one(conn)
        .await?
        .is_none()
    {
        return Ok(Some(IssueCode::ResourceNotFound));
    }
    if claims.resources.contains(&resource_id) {
        return Ok(Some(IssueCode::ResourceAlreadyActive));
    }
    Ok(None)
}

/// Writes one accepted line. A queued item with a free copy is assigned at once.
async fn apply_plan<C: ConnectionTrait>(
    conn: &C,
    request: &borrow_request::Model,
    plan: Planned,
    policy: &LendingPolicy,
    ctx: &OpContext,
) -> Result<Option<ReservationNotice>, LendingError> {
    let mut notice = None;
    match plan {
        Planned::Line(item_id) => {
            ledger::reserve(conn, item_id, HoldKind::Requested)
                .await
                .map_err(|e| e.localize(ctx.locale))?;
            request_line::ActiveModel {
                request_id: Set(request.id),
                item_id: Set(item_id),
                created_at: Set(ctx.now),
                ..Default::default()
            }
            .insert(conn)
            .await?;
        }
        Planned::Queue(item_id) => {
            reservation_queue::enqueue(conn, request.id, request.card_id, item_id, ctx).await?;
            notice = reservation_queue::assign_next(conn, item_id, None, policy, ctx).await?;
        }
    }
    tracing::debug!(request_id = request.id, item_id = plan.item_id(), ?plan, "line planned");
    Ok(notice)
}

async fn insert_resource_line<C: ConnectionTrait>(
    conn: &C,
    request_id: i32,
    resource_id: i32,
) -> Result<(), LendingError> {
    resource_line::ActiveModel {
        request_id: Set(request_id),
        resource_id: Set(resource_id),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(())
}

/// Gives back every unit the request holds and closes its waitlist entries.
async fn release_holdings<C: ConnectionTrait>(
    conn: &C,
    request: &borrow_request::Model,
    event: ReservationEvent,
    policy: &LendingPolicy,
    ctx: &OpContext,
) -> Result<Vec<ReservationNotice>, LendingError> {
    let mut assigned = Vec::new();

    let entries = reservation::Entity::find()
        .filter(reservation::Column::RequestId.eq(request.id))
        .all(conn)
        .await?;
    for entry in entries.iter().filter(|e| e.status.is_active()) {
        assigned.extend(reservation_queue::close(conn, entry, event, policy, ctx).await?);
    }

    let lines = request_line::Entity::find()
        .filter(request_line::Column::RequestId.eq(request.id))
        .all(conn)
        .await?;
    for line in lines {
        ledger::release(conn, line.item_id, HoldKind::Requested)
            .await
            .map_err(|e| e.localize(ctx.locale))?;
        assigned.extend(reservation_queue::assign_next(conn, line.item_id, None, policy, ctx).await?);
    }
    Ok(assigned)
}

async fn prune_if_empty<C: ConnectionTrait>(conn: &C, request_id: i32) -> Result<bool, LendingError> {
    let lines = request_line::Entity::find()
        .filter(request_line::Column::RequestId.eq(request_id))
        .count(conn)
        .await?;
    let resources = resource_line::Entity::find()
        .filter(resource_line::Column::RequestId.eq(request_id))
        .count(conn)
        .await?;
    let waiting = reservation::Entity::find()
        .filter(reservation::Column::RequestId.eq(request_id))
        .all(conn)
        .await?
        .iter()
        .filter(|e| e.status.is_active())
        .count();
    if lines + resources > 0 || waiting > 0 {
        return Ok(false);
    }

    reservation::Entity::delete_many()
        .filter(reservation::Column::RequestId.eq(request_id))
        .exec(conn)
        .await?;
    BorrowRequest::delete_by_id(request_id).exec(conn).await?;
    tracing::info!(request_id, "empty request deleted");
    Ok(true)
}

