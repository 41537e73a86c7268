//! Lending Record Service - realized loans
//!
//! A record is created from an open request, from a walk-in at the desk, or
//! from a self-service kiosk. Each copy handed out becomes one detail line;
//! the unit it came from (request hold, reservation hold, or shelf) moves to
//! `borrowed` in the same transaction.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::domain::{Field, IssueCode, Issues, LendingError, LoanConfirmation, OpContext};
use crate::models::status::{
    BorrowType, DetailEvent, DetailStatus, InstanceEvent, InstanceStatus, RecordOrigin,
    RequestEvent, ReservationStatus,
};
use crate::models::{
    borrow_record, borrow_request, extension, instance, inventory, record_detail, request_line,
    reservation,
};
use crate::services::instance_claims;
use crate::services::inventory_ledger::{self as ledger, HoldKind};
use crate::services::policy::LendingPolicy;
use crate::services::projections;
use crate::services::request_service;
use crate::services::reservation_queue;

/// A record and its lines.
#[derive(Debug, Clone, Serialize)]
pub struct RecordSummary {
    pub record: borrow_record::Model,
    pub details: Vec<record_detail::Model>,
}

impl RecordSummary {
    pub fn confirmation(&self) -> LoanConfirmation {
        LoanConfirmation {
            record_id: self.record.id,
            card_id: self.record.card_id,
            instance_ids: self.details.iter().map(|d| d.instance_id).collect(),
            due_date: self.details.iter().filter_map(|d| d.due_date).max(),
        }
    }
}

/// Desk or kiosk checkout without a prior request.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutInput {
    pub card_id: i32,
    pub instance_ids: Vec<i32>,
    #[serde(default)]
    pub borrow_type: BorrowType,
}

/// Where the unit for a copy comes from.
#[derive(Debug, Clone)]
enum UnitSource {
    RequestLine,
    Reservation(reservation::Model),
    Shelf,
}

#[derive(Debug, Clone)]
struct PlannedLoan {
    copy: instance::Model,
    condition: String,
    source: UnitSource,
}

/// Turn an open request into a record, one copy per line or assigned reservation.
pub async fn process_request_to_record<C: ConnectionTrait>(
    conn: &C,
    policy: &LendingPolicy,
    ctx: &OpContext,
    request_id: i32,
    instance_ids: &[i32],
) -> Result<RecordSummary, LendingError> {
    let request = borrow_request::Entity::find_by_id(request_id)
        .one(conn)
        .await?
        .ok_or(LendingError::not_found("request", request_id))?;
    let next = request
        .status
        .apply(RequestEvent::Fulfil)
        .map_err(|_| LendingError::state(IssueCode::RequestNotMutable, ctx.locale))?;

    let lines = request_line::Entity::find()
        .filter(request_line::Column::RequestId.eq(request_id))
        .all(conn)
        .await?;
    let held: HashMap<i32, reservation::Model> = reservation::Entity::find()
        .filter(reservation::Column::RequestId.eq(request_id))
        .filter(reservation::Column::Status.eq(ReservationStatus::Assigned))
        .all(conn)
        .await?
        .into_iter()
        .map(|entry| (entry.item_id, entry))
        .collect();
    let line_items: HashSet<i32> = lines.iter().map(|l| l.item_id).collect();

    let mut issues = Issues::new(ctx.locale);
    let expected = lines.len() + held.len();
    if expected == 0 {
        issues.general(IssueCode::EmptyRequest);
    } else if instance_ids.len() < expected {
        issues.general(IssueCode::TooFewInstances);
    } else if instance_ids.len() > expected {
        issues.general(IssueCode::TooManyInstances);
    }

    let copies = instance_claims::load_instances(conn, instance_ids).await?;
    let mut seen = HashSet::new();
    let mut seen_items = HashSet::new();
    let mut planned = Vec::new();
    for (idx, &instance_id) in instance_ids.iter().enumerate() {
        if !seen.insert(instance_id) {
            issues.line(Field::Instances, idx, IssueCode::DuplicateInstance);
            continue;
        }
        let Some(copy) = copies.get(&instance_id) else {
            issues.line(Field::Instances, idx, IssueCode::InstanceNotFound);
            continue;
        };
        if !seen_items.insert(copy.item_id) {
            issues.line(Field::Instances, idx, IssueCode::SameItemTwice);
            continue;
        }

        let source = if let Some(entry) = held.get(&copy.item_id) {
            if entry.instance_id != Some(copy.id) {
                issues.line(Field::Instances, idx, IssueCode::WrongInstanceForReservation);
                continue;
            }
            UnitSource::Reservation(entry.clone())
        } else if line_items.contains(&copy.item_id) {
            match copy.status {
                InstanceStatus::InShelf => UnitSource::RequestLine,
                InstanceStatus::Borrowed => {
                    issues.line(Field::Instances, idx, IssueCode::InstanceAlreadyBorrowed);
                    continue;
                }
                InstanceStatus::Reserved => {
                    issues.line(Field::Instances, idx, IssueCode::InstanceReservedForOther);
                    continue;
                }
                InstanceStatus::OutOfShelf | InstanceStatus::Lost => {
                    issues.line(Field::Instances, idx, IssueCode::InstanceUnavailable);
                    continue;
                }
            }
        } else {
            issues.line(Field::Instances, idx, IssueCode::ItemNotInRequest);
            continue;
        };

        match instance_claims::latest_condition(conn, copy.id).await? {
            Some(condition) => planned.push(PlannedLoan {
                copy: copy.clone(),
                condition,
                source,
            }),
            None => issues.line(Field::Instances, idx, IssueCode::MissingConditionHistory),
        }
    }

    if let Err(e) = issues.into_result() {
        tracing::warn!(request_id, error = %e, "request conversion rejected");
        return Err(e);
    }

    request_service::set_status(conn, &request, next, ctx).await?;
    let record = borrow_record::ActiveModel {
        card_id: Set(request.card_id),
        request_id: Set(Some(request.id)),
        borrow_type: Set(request.borrow_type),
        origin: Set(RecordOrigin::Request),
        borrowed_at: Set(ctx.now),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    let details = open_loans(conn, policy, ctx, &record, planned).await?;
    tracing::info!(request_id, record_id = record.id, lines = details.len(), "request fulfilled");
    Ok(RecordSummary { record, details })
}

/// Hand copies straight to a patron, at the desk or at a kiosk.
pub async fn checkout<C: ConnectionTrait>(
    conn: &C,
    policy: &LendingPolicy,
    ctx: &OpContext,
    input: CheckoutInput,
    origin: RecordOrigin,
) -> Result<RecordSummary, LendingError> {
    let standing = projections::card_standing(conn, input.card_id, ctx.now)
        .await?
        .ok_or(LendingError::not_found("card", input.card_id))?;

    let mut issues = Issues::new(ctx.locale);
    if let Some(code) = standing.blocking_issue() {
        issues.general(code);
    }
    if origin == RecordOrigin::SelfService && input.borrow_type == BorrowType::InLibrary {
        issues.general(IssueCode::SelfServiceInLibrary);
    }
    if input.instance_ids.is_empty() {
        issues.general(IssueCode::EmptyRequest);
    }

    let claims = projections::active_claims(conn, input.card_id).await?;
    let usage = projections::card_usage(conn, input.card_id).await?;
    let ceiling = policy.borrow_ceiling(&usage);

    let copies = instance_claims::load_instances(conn, &input.instance_ids).await?;
    let item_ids: Vec<i32> = copies
        .values()
        .map(|c| c.item_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let scan =
        instance_claims::scan_claims(conn, input.card_id, &input.instance_ids, &item_ids).await?;
    let counters: HashMap<i32, inventory::Model> = if item_ids.is_empty() {
        HashMap::new()
    } else {
        inventory::Entity::find()
            .filter(inventory::Column::ItemId.is_in(item_ids.clone()))
            .all(conn)
            .await?
            .into_iter()
            .map(|c| (c.item_id, c))
            .collect()
    };

    let mut seen = HashSet::new();
    let mut seen_items = HashSet::new();
    let mut accepted = 0;
    let mut planned = Vec::new();
    for (idx, &instance_id) in input.instance_ids.iter().enumerate() {
        if !seen.insert(instance_id) {
            issues.line(Field::Instances, idx, IssueCode::DuplicateInstance);
            continue;
        }
        let Some(copy) = copies.get(&instance_id) else {
            issues.line(Field::Instances, idx, IssueCode::InstanceNotFound);
            continue;
        };
        if !seen_items.insert(copy.item_id) {
            issues.line(Field::Instances, idx, IssueCode::SameItemTwice);
            continue;
        }
        if scan.on_loan.contains(&copy.id) || copy.status == InstanceStatus::Borrowed {
            issues.line(Field::Instances, idx, IssueCode::InstanceAlreadyBorrowed);
            continue;
        }

        let source = match scan.held.get(&copy.id) {
            Some(entry) if entry.card_id == input.card_id => UnitSource::Reservation(entry.clone()),
            Some(_) => {
                issues.line(Field::Instances, idx, IssueCode::InstanceReservedForOther);
                continue;
            }
            None => {
                let code = match copy.status {
                    InstanceStatus::InShelf => None,
                    InstanceStatus::Reserved => Some(IssueCode::InstanceReservedForOther),
                    InstanceStatus::OutOfShelf | InstanceStatus::Lost | InstanceStatus::Borrowed => {
                        Some(IssueCode::InstanceUnavailable)
                    }
                };
                let code = code
                    .or_else(|| claims.conflict_for(copy.item_id))
                    .or_else(|| (accepted >= ceiling).then_some(IssueCode::BorrowLimitExceeded))
                    .or_else(|| {
                        let free = counters.get(&copy.item_id).is_some_and(|c| c.available > 0);
                        match (free, scan.requested_by_others.contains(&copy.item_id)) {
                            (true, _) => None,
                            (false, true) => Some(IssueCode::InstanceRequestedByOther),
                            (false, false) => Some(IssueCode::CapacityExhausted),
                        }
                    });
                if let Some(code) = code {
                    issues.line(Field::Instances, idx, code);
                    continue;
                }
                accepted += 1;
                UnitSource::Shelf
            }
        };

        match instance_claims::latest_condition(conn, copy.id).await? {
            Some(condition) => planned.push(PlannedLoan {
                copy: copy.clone(),
                condition,
                source,
            }),
            None => issues.line(Field::Instances, idx, IssueCode::MissingConditionHistory),
        }
    }

    if let Err(e) = issues.into_result() {
        tracing::warn!(card_id = input.card_id, ?origin, error = %e, "checkout rejected");
        return Err(e);
    }

    let record = borrow_record::ActiveModel {
        card_id: Set(input.card_id),
        request_id: Set(None),
        borrow_type: Set(input.borrow_type),
        origin: Set(origin),
        borrowed_at: Set(ctx.now),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    let details = open_loans(conn, policy, ctx, &record, planned).await?;
    tracing::info!(record_id = record.id, card_id = record.card_id, ?origin, "checkout done");
    Ok(RecordSummary { record, details })
}

/// Push the due date of some lines of a record; all lines pass or none move.
pub async fn extend_due_date<C: ConnectionTrait>(
    conn: &C,
    policy: &LendingPolicy,
    ctx: &OpContext,
    record_id: i32,
    detail_ids: &[i32],
) -> Result<Vec<record_detail::Model>, LendingError> {
    borrow_record::Entity::find_by_id(record_id)
        .one(conn)
        .await?
        .ok_or(LendingError::not_found("record", record_id))?;
    let details: HashMap<i32, record_detail::Model> = record_detail::Entity::find()
        .filter(record_detail::Column::RecordId.eq(record_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|d| (d.id, d))
        .collect();

    let mut issues = Issues::new(ctx.locale);
    if detail_ids.is_empty() {
        issues.general(IssueCode::EmptyRequest);
    }
    let mut seen = HashSet::new();
    let mut plans = Vec::new();
    for (idx, &detail_id) in detail_ids.iter().enumerate() {
        if !seen.insert(detail_id) {
            issues.line(Field::Details, idx, IssueCode::DuplicateDetail);
            continue;
        }
        let Some(detail) = details.get(&detail_id) else {
            issues.line(Field::Details, idx, IssueCode::DetailNotFound);
            continue;
        };
        let waiting = reservation::Entity::find()
            .filter(reservation::Column::ItemId.eq(detail.item_id))
            .filter(reservation::Column::Status.eq(ReservationStatus::Pending))
            .count(conn)
            .await?
            > 0;
        match policy.check_extension(detail, waiting, ctx.now) {
            Ok(plan) => plans.push((detail, plan)),
            Err(code) => issues.line(Field::Details, idx, code),
        }
    }
    issues.into_result()?;

    for (detail, plan) in &plans {
        let result = record_detail::Entity::update_many()
            .col_expr(record_detail::Column::DueDate, Expr::value(plan.new_due_date))
            .col_expr(
                record_detail::Column::ExtensionCount,
                Expr::col(record_detail::Column::ExtensionCount).add(1),
            )
            .col_expr(
                record_detail::Column::ReservationExtensionUsed,
                Expr::value(detail.reservation_extension_used || plan.consumes_reservation_extension),
            )
            .col_expr(
                record_detail::Column::Version,
                Expr::col(record_detail::Column::Version).add(1),
            )
            .filter(record_detail::Column::Id.eq(detail.id))
            .filter(record_detail::Column::Version.eq(detail.version))
            .exec(conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(LendingError::conflict(
                IssueCode::ConcurrentModification,
                ctx.locale,
            ));
        }
        extension::ActiveModel {
            detail_id: Set(detail.id),
            previous_due_date: Set(plan.previous_due_date),
            new_due_date: Set(plan.new_due_date),
            extended_at: Set(ctx.now),
            ..Default::default()
        }
        .insert(conn)
        .await?;
        tracing::info!(detail_id = detail.id, new_due_date = %plan.new_due_date, "due date extended");
    }

    Ok(record_detail::Entity::find()
        .filter(record_detail::Column::Id.is_in(detail_ids.to_vec()))
        .order_by_asc(record_detail::Column::Id)
        .all(conn)
        .await?)
}

/// Flag take-home lines whose due date has passed.
pub async fn sweep_overdue<C: ConnectionTrait>(
    conn: &C,
    ctx: &OpContext,
) -> Result<Vec<i32>, LendingError> {
    let flagged = flag_late_lines(conn, None, ctx).await?;
    if !flagged.is_empty() {
        tracing::info!(overdue = flagged.len(), "overdue sweep done");
    }
    Ok(flagged)
}

/// Moves Borrowing lines past their due date to Overdue, optionally for one record.
pub(crate) async fn flag_late_lines<C: ConnectionTrait>(
    conn: &C,
    record_id: Option<i32>,
    ctx: &OpContext,
) -> Result<Vec<i32>, LendingError> {
    let mut query =
        record_detail::Entity::find().filter(record_detail::Column::Status.eq(DetailStatus::Borrowing));
    if let Some(record_id) = record_id {
        query = query.filter(record_detail::Column::RecordId.eq(record_id));
    }
    let late: Vec<record_detail::Model> = query
        .all(conn)
        .await?
        .into_iter()
        .filter(|d| d.due_date.is_some_and(|due| due < ctx.now))
        .collect();

    let mut flagged = Vec::new();
    for detail in late {
        set_detail_status(conn, &detail, DetailEvent::MarkOverdue, None, ctx).await?;
        flagged.push(detail.id);
    }
    Ok(flagged)
}

pub async fn load_record<C: ConnectionTrait>(
    conn: &C,
    record_id: i32,
) -> Result<RecordSummary, LendingError> {
    let record = borrow_record::Entity::find_by_id(record_id)
        .one(conn)
        .await?
        .ok_or(LendingError::not_found("record", record_id))?;
    let details = record_detail::Entity::find()
        .filter(record_detail::Column::RecordId.eq(record_id))
        .order_by_asc(record_detail::Column::Id)
        .all(conn)
        .await?;
    Ok(RecordSummary { record, details })
}

/// Compare-and-set a detail to the status `event` leads to.
pub(crate) async fn set_detail_status<C: ConnectionTrait>(
    conn: &C,
    detail: &record_detail::Model,
    event: DetailEvent,
    closing: Option<(DateTime<Utc>, Option<String>)>,
    ctx: &OpContext,
) -> Result<DetailStatus, LendingError> {
    let next = detail
        .status
        .apply(event)
        .map_err(|_| LendingError::state(IssueCode::DetailClosed, ctx.locale))?;

    let mut update = record_detail::Entity::update_many()
        .col_expr(record_detail::Column::Status, Expr::value(next))
        .col_expr(
            record_detail::Column::Version,
            Expr::col(record_detail::Column::Version).add(1),
        );
    if let Some((returned_at, condition_after)) = closing {
        update = update
            .col_expr(record_detail::Column::ReturnDate, Expr::value(returned_at))
            .col_expr(record_detail::Column::ConditionAfter, Expr::value(condition_after));
    }
    let result = update
        .filter(record_detail::Column::Id.eq(detail.id))
        .filter(record_detail::Column::Version.eq(detail.version))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        tracing::warn!(detail_id = detail.id, ?event, "lost race on loan line");
        return Err(LendingError::conflict(
            IssueCode::ConcurrentModification,
            ctx.locale,
        ));
    }
    Ok(next)
}

async fn open_loans<C: ConnectionTrait>(
    conn: &C,
    policy: &LendingPolicy,
    ctx: &OpContext,
    record: &borrow_record::Model,
    planned: Vec<PlannedLoan>,
) -> Result<Vec<record_detail::Model>, LendingError> {
    let item_ids: Vec<i32> = planned.iter().map(|p| p.copy.item_id).collect();
    let period = projections::longest_borrow_period(conn, &item_ids).await?;
    let due_date = policy.due_date(record.borrow_type, ctx.now, period);

    let mut details = Vec::with_capacity(planned.len());
    for loan in planned {
        let item_id = loan.copy.item_id;
        match &loan.source {
            UnitSource::RequestLine => ledger::commit(conn, item_id, HoldKind::Requested)
                .await
                .map_err(|e| e.localize(ctx.locale))?,
            UnitSource::Reservation(entry) => {
                reservation_queue::collect(conn, entry, ctx).await?;
            }
            UnitSource::Shelf => {
                ledger::reserve(conn, item_id, HoldKind::Requested)
                    .await
                    .map_err(|e| e.localize(ctx.locale))?;
                ledger::commit(conn, item_id, HoldKind::Requested)
                    .await
                    .map_err(|e| e.localize(ctx.locale))?;
            }
        }
        instance_claims::transition(conn, &loan.copy, InstanceEvent::Checkout, ctx).await?;

        let detail = record_detail::ActiveModel {
            record_id: Set(record.id),
            card_id: Set(record.card_id),
            instance_id: Set(loan.copy.id),
            item_id: Set(item_id),
            status: Set(DetailStatus::Borrowing),
            due_date: Set(due_date),
            return_date: Set(None),
            condition_before: Set(loan.condition),
            condition_after: Set(None),
            extension_count: Set(0),
            reservation_extension_used: Set(false),
            version: Set(0),
            ..Default::default()
        }
        .insert(conn)
        .await?;
        details.push(detail);
    }
    Ok(details)
}

