//! Return Service - closing loan lines
//!
//! A return call names the lines coming back and the lines declared lost.
//! Lines that are due and left out of both lists must be acknowledged with
//! `confirm_missing`, otherwise the whole call is refused.

use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::domain::{Field, IssueCode, Issues, LendingError, OpContext, ReservationNotice};
use crate::models::status::{ConditionType, DetailEvent, DetailStatus, FineStatus, InstanceEvent};
use crate::models::{borrow_record, condition_record, fine, fine_policy, instance, item, record_detail};
use crate::services::instance_claims;
use crate::services::inventory_ledger as ledger;
use crate::services::policy::{self, LendingPolicy};
use crate::services::record_service;
use crate::services::reservation_queue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FineClaim {
    pub policy_id: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReturnedLine {
    pub detail_id: i32,
    pub condition: Option<String>,
    #[serde(default)]
    pub fines: Vec<FineClaim>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LostLine {
    pub detail_id: i32,
    #[serde(default)]
    pub fines: Vec<FineClaim>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReturnInput {
    #[serde(default)]
    pub returned: Vec<ReturnedLine>,
    #[serde(default)]
    pub lost: Vec<LostLine>,
    /// Acknowledges due lines that are in neither list.
    #[serde(default)]
    pub confirm_missing: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReturnOutcome {
    pub returned: Vec<i32>,
    pub lost: Vec<i32>,
    pub fines: Vec<fine::Model>,
    pub assigned: Vec<ReservationNotice>,
}

struct Charge {
    policy: fine_policy::Model,
    amount_cents: i64,
}

struct Closing {
    detail: record_detail::Model,
    condition: Option<String>,
    charges: Vec<Charge>,
}

pub async fn process_return<C: ConnectionTrait>(
    conn: &C,
    policy: &LendingPolicy,
    ctx: &OpContext,
    record_id: i32,
    input: ReturnInput,
) -> Result<ReturnOutcome, LendingError> {
    borrow_record::Entity::find_by_id(record_id)
        .one(conn)
        .await?
        .ok_or(LendingError::not_found("record", record_id))?;
    // Catch up on the overdue sweep so the fine rule sees each line's real status.
    let flagged = record_service::flag_late_lines(conn, Some(record_id), ctx).await?;
    if !flagged.is_empty() {
        tracing::debug!(record_id, ?flagged, "late lines flagged at return");
    }
    let details: HashMap<i32, record_detail::Model> = record_detail::Entity::find()
        .filter(record_detail::Column::RecordId.eq(record_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|d| (d.id, d))
        .collect();

    let returned_ids: HashSet<i32> = input.returned.iter().map(|l| l.detail_id).collect();
    let lost_ids: HashSet<i32> = input.lost.iter().map(|l| l.detail_id).collect();
    let mut missing: Vec<i32> = details
        .values()
        .filter(|d| is_due(d, ctx))
        .filter(|d| !returned_ids.contains(&d.id) && !lost_ids.contains(&d.id))
        .map(|d| d.id)
        .collect();
    if !missing.is_empty() && !input.confirm_missing {
        missing.sort_unstable();
        tracing::info!(record_id, ?missing, "return needs confirmation");
        return Err(LendingError::ConfirmMissing {
            detail_ids: missing,
        });
    }

    let policy_ids: Vec<i32> = input
        .returned
        .iter()
        .flat_map(|l| l.fines.iter())
        .chain(input.lost.iter().flat_map(|l| l.fines.iter()))
        .map(|f| f.policy_id)
        .collect();
    let fine_policies: HashMap<i32, fine_policy::Model> = if policy_ids.is_empty() {
        HashMap::new()
    } else {
        fine_policy::Entity::find()
            .filter(fine_policy::Column::Id.is_in(policy_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect()
    };
    let item_ids: Vec<i32> = details.values().map(|d| d.item_id).collect();
    let prices: HashMap<i32, Option<i64>> = item::Entity::find()
        .filter(item::Column::Id.is_in(item_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|i| (i.id, i.estimated_price_cents))
        .collect();

    let mut issues = Issues::new(ctx.locale);
    if input.returned.is_empty() && input.lost.is_empty() && missing.is_empty() {
        issues.general(IssueCode::EmptyRequest);
    }

    let mut seen = HashSet::new();
    let mut returns = Vec::new();
    for (idx, line) in input.returned.iter().enumerate() {
        let Some(detail) = open_line(&mut issues, Field::Returned, idx, line.detail_id, &details, &lost_ids, &mut seen)
        else {
            continue;
        };
        let price = prices.get(&detail.item_id).copied().flatten();
        let days = policy::days_overdue(detail.due_date, ctx.now);

        let mut charges = Vec::new();
        match (detail.status == DetailStatus::Overdue, line.fines.as_slice()) {
            (true, [claim]) => {
                match charge_for(claim, &fine_policies, price, days, |t| t == ConditionType::Overdue) {
                    Ok(charge) => charges.push(charge),
                    Err(code) => issues.line(Field::Returned, idx, code),
                }
            }
            (true, _) => issues.line(Field::Returned, idx, IssueCode::OverdueFineRequired),
            (false, []) => {}
            (false, _) => issues.line(Field::Returned, idx, IssueCode::UnexpectedFine),
        }

        let condition = line
            .condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        if condition.is_none() {
            issues.line(Field::Returned, idx, IssueCode::ReturnConditionRequired);
        }
        returns.push(Closing {
            detail: detail.clone(),
            condition,
            charges,
        });
    }

    let mut losses = Vec::new();
    for (idx, line) in input.lost.iter().enumerate() {
        if returned_ids.contains(&line.detail_id) {
            continue;
        }
        let Some(detail) = open_line(&mut issues, Field::Lost, idx, line.detail_id, &details, &HashSet::new(), &mut seen)
        else {
            continue;
        };
        let price = prices.get(&detail.item_id).copied().flatten();
        let days = policy::days_overdue(detail.due_date, ctx.now);

        let mut charges = Vec::new();
        for claim in &line.fines {
            match charge_for(claim, &fine_policies, price, days, |t| t != ConditionType::Damaged) {
                Ok(charge) => charges.push(charge),
                Err(code) => issues.line(Field::Lost, idx, code),
            }
        }
        let covers_loss = line.fines.iter().any(|claim| {
            fine_policies
                .get(&claim.policy_id)
                .is_some_and(|p| p.condition_type == ConditionType::Lost)
        });
        if !covers_loss {
            issues.line(Field::Lost, idx, IssueCode::LostFineRequired);
        }
        losses.push(Closing {
            detail: detail.clone(),
            condition: None,
            charges,
        });
    }

    if let Err(e) = issues.into_result() {
        tracing::warn!(record_id, error = %e, "return rejected");
        return Err(e);
    }

    let mut outcome = ReturnOutcome::default();
    for closing in returns {
        let detail_id = closing.detail.id;
        let freed = close_line(conn, ctx, &closing, DetailEvent::Return, &mut outcome).await?;
        outcome
            .assigned
            .extend(reservation_queue::assign_next(conn, closing.detail.item_id, Some(freed), policy, ctx).await?);
        outcome.returned.push(detail_id);
    }
    for closing in losses {
        close_line(conn, ctx, &closing, DetailEvent::Lose, &mut outcome).await?;
        outcome.lost.push(closing.detail.id);
    }

    tracing::info!(
        record_id,
        returned = outcome.returned.len(),
        lost = outcome.lost.len(),
        fines = outcome.fines.len(),
        "return processed"
    );
    Ok(outcome)
}

/// Open and due today or earlier, or already flagged overdue.
fn is_due(detail: &record_detail::Model, ctx: &OpContext) -> bool {
    detail.status == DetailStatus::Overdue
        || (detail.status == DetailStatus::Borrowing
            && detail
                .due_date
                .is_some_and(|due| due.date_naive() <= ctx.now.date_naive()))
}

fn open_line<'a>(
    issues: &mut Issues,
    field: Field,
    idx: usize,
    detail_id: i32,
    details: &'a HashMap<i32, record_detail::Model>,
    other_list: &HashSet<i32>,
    seen: &mut HashSet<i32>,
) -> Option<&'a record_detail::Model> {
    if other_list.contains(&detail_id) {
        issues.line(field, idx, IssueCode::DetailInBothLists);
        seen.insert(detail_id);
        return None;
    }
    if !seen.insert(detail_id) {
        issues.line(field, idx, IssueCode::DuplicateDetail);
        return None;
    }
    let Some(detail) = details.get(&detail_id) else {
        issues.line(field, idx, IssueCode::DetailNotFound);
        return None;
    };
    if !detail.status.is_open() {
        issues.line(field, idx, IssueCode::DetailClosed);
        return None;
    }
    Some(detail)
}

fn charge_for(
    claim: &FineClaim,
    fine_policies: &HashMap<i32, fine_policy::Model>,
    price: Option<i64>,
    days: i64,
    accepts: impl Fn(ConditionType) -> bool,
) -> Result<Charge, IssueCode> {
    let fine_policy = fine_policies
        .get(&claim.policy_id)
        .ok_or(IssueCode::FinePolicyNotFound)?;
    if !accepts(fine_policy.condition_type) {
        return Err(IssueCode::WrongFineType);
    }
    let amount_cents = policy::fine_amount(fine_policy, price, days)?;
    Ok(Charge {
        policy: fine_policy.clone(),
        amount_cents,
    })
}

/// Closes one line and returns the copy it freed.
async fn close_line<C: ConnectionTrait>(
    conn: &C,
    ctx: &OpContext,
    closing: &Closing,
    event: DetailEvent,
    outcome: &mut ReturnOutcome,
) -> Result<i32, LendingError> {
    let detail = &closing.detail;
    record_service::set_detail_status(
        conn,
        detail,
        event,
        Some((ctx.now, closing.condition.clone())),
        ctx,
    )
    .await?;

    for charge in &closing.charges {
        let created = fine::ActiveModel {
            detail_id: Set(detail.id),
            card_id: Set(detail.card_id),
            policy_id: Set(charge.policy.id),
            condition_type: Set(charge.policy.condition_type),
            amount_cents: Set(charge.amount_cents),
            status: Set(FineStatus::Pending),
            created_at: Set(ctx.now),
            ..Default::default()
        }
        .insert(conn)
        .await?;
        outcome.fines.push(created);
    }

    let copy = instance::Entity::find_by_id(detail.instance_id)
        .one(conn)
        .await?
        .ok_or(LendingError::not_found("instance", detail.instance_id))?;
    if event == DetailEvent::Lose {
        instance_claims::transition(conn, &copy, InstanceEvent::MarkLost, ctx).await?;
        ledger::mark_lost(conn, detail.item_id)
            .await
            .map_err(|e| e.localize(ctx.locale))?;
        return Ok(copy.id);
    }

    instance_claims::transition(conn, &copy, InstanceEvent::Return, ctx).await?;
    ledger::return_unit(conn, detail.item_id)
        .await
        .map_err(|e| e.localize(ctx.locale))?;
    if let Some(condition) = &closing.condition {
        condition_record::ActiveModel {
            instance_id: Set(copy.id),
            condition: Set(condition.clone()),
            recorded_at: Set(ctx.now),
            ..Default::default()
        }
        .insert(conn)
        .await?;
    }
    Ok(copy.id)
}
