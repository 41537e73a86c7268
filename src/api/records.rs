use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::error::{ApiContext, ApiError};
use crate::models::record_detail;
use crate::services::record_service::{CheckoutInput, RecordSummary};
use crate::services::return_service::{ReturnInput, ReturnOutcome};
use crate::services::LendingEngine;

#[derive(Deserialize)]
pub struct ExtendBody {
    pub detail_ids: Vec<i32>,
}

pub async fn walk_in_checkout(
    State(engine): State<LendingEngine>,
    ApiContext(ctx): ApiContext,
    Json(input): Json<CheckoutInput>,
) -> Result<(StatusCode, Json<RecordSummary>), ApiError> {
    let summary = engine.walk_in_checkout(&ctx, input).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn self_checkout(
    State(engine): State<LendingEngine>,
    ApiContext(ctx): ApiContext,
    Json(input): Json<CheckoutInput>,
) -> Result<(StatusCode, Json<RecordSummary>), ApiError> {
    let summary = engine.self_checkout(&ctx, input).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn get_record(
    State(engine): State<LendingEngine>,
    Path(id): Path<i32>,
) -> Result<Json<RecordSummary>, ApiError> {
    Ok(Json(engine.get_record(id).await?))
}

pub async fn extend_due_date(
    State(engine): State<LendingEngine>,
    ApiContext(ctx): ApiContext,
    Path(id): Path<i32>,
    Json(body): Json<ExtendBody>,
) -> Result<Json<Vec<record_detail::Model>>, ApiError> {
    Ok(Json(engine.extend_due_date(&ctx, id, body.detail_ids).await?))
}

pub async fn process_return(
    State(engine): State<LendingEngine>,
    ApiContext(ctx): ApiContext,
    Path(id): Path<i32>,
    Json(input): Json<ReturnInput>,
) -> Result<Json<ReturnOutcome>, ApiError> {
    Ok(Json(engine.process_return(&ctx, id, input).await?))
}
