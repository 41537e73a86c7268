use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::{ApiContext, ApiError};
use crate::domain::PatronKey;
use crate::services::activity_service::{ActiveLoan, ActivitySummary, PendingRequest};
use crate::services::LendingEngine;

#[derive(Deserialize)]
pub struct LookupQuery {
    pub email: String,
}

/// `card_id` is null when no card carries the address.
pub async fn lookup_card(
    State(engine): State<LendingEngine>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<Value>, ApiError> {
    let card_id = engine.resolve_card(&PatronKey::Email(query.email)).await?;
    Ok(Json(json!({ "card_id": card_id })))
}

pub async fn active_loans(
    State(engine): State<LendingEngine>,
    Path(card_id): Path<i32>,
) -> Result<Json<Vec<ActiveLoan>>, ApiError> {
    Ok(Json(engine.get_active_loans(card_id).await?))
}

pub async fn pending_requests(
    State(engine): State<LendingEngine>,
    Path(card_id): Path<i32>,
) -> Result<Json<Vec<PendingRequest>>, ApiError> {
    Ok(Json(engine.get_pending_requests(card_id).await?))
}

pub async fn activity_summary(
    State(engine): State<LendingEngine>,
    Path(card_id): Path<i32>,
) -> Result<Json<ActivitySummary>, ApiError> {
    Ok(Json(engine.calculate_activity_summary(card_id).await?))
}

/// 200 when the card may queue for the item, 409 with the blocking claim otherwise.
pub async fn check_reservable(
    State(engine): State<LendingEngine>,
    ApiContext(ctx): ApiContext,
    Path((card_id, item_id)): Path<(i32, i32)>,
) -> Result<Json<Value>, ApiError> {
    engine.check_allow_to_reserve(&ctx, card_id, item_id).await?;
    Ok(Json(json!({ "card_id": card_id, "item_id": item_id, "allowed": true })))
}
