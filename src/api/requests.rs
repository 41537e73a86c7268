use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::error::{ApiContext, ApiError};
use crate::services::record_service::RecordSummary;
use crate::services::request_service::{
    LineRemoval, NewRequest, RequestClosure, RequestLineRef, RequestSummary,
};
use crate::services::LendingEngine;

#[derive(Deserialize)]
pub struct AddItemBody {
    pub item_id: i32,
}

#[derive(Deserialize)]
pub struct AddResourceBody {
    pub resource_id: i32,
}

#[derive(Deserialize)]
pub struct FulfilBody {
    pub instance_ids: Vec<i32>,
}

pub async fn create_request(
    State(engine): State<LendingEngine>,
    ApiContext(ctx): ApiContext,
    Json(input): Json<NewRequest>,
) -> Result<(StatusCode, Json<RequestSummary>), ApiError> {
    let summary = engine.create_request(&ctx, input).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn get_request(
    State(engine): State<LendingEngine>,
    Path(id): Path<i32>,
) -> Result<Json<RequestSummary>, ApiError> {
    Ok(Json(engine.get_request(id).await?))
}

pub async fn cancel_request(
    State(engine): State<LendingEngine>,
    ApiContext(ctx): ApiContext,
    Path(id): Path<i32>,
) -> Result<Json<RequestClosure>, ApiError> {
    Ok(Json(engine.cancel_request(&ctx, id).await?))
}

pub async fn add_item(
    State(engine): State<LendingEngine>,
    ApiContext(ctx): ApiContext,
    Path(id): Path<i32>,
    Json(body): Json<AddItemBody>,
) -> Result<Json<RequestSummary>, ApiError> {
    Ok(Json(engine.add_item_to_request(&ctx, id, body.item_id).await?))
}

pub async fn add_resource(
    State(engine): State<LendingEngine>,
    ApiContext(ctx): ApiContext,
    Path(id): Path<i32>,
    Json(body): Json<AddResourceBody>,
) -> Result<Json<RequestSummary>, ApiError> {
    Ok(Json(
        engine
            .add_resource_to_request(&ctx, id, body.resource_id)
            .await?,
    ))
}

pub async fn cancel_item_line(
    State(engine): State<LendingEngine>,
    ApiContext(ctx): ApiContext,
    Path((id, line_id)): Path<(i32, i32)>,
) -> Result<Json<LineRemoval>, ApiError> {
    Ok(Json(
        engine
            .cancel_request_line(&ctx, id, RequestLineRef::Item(line_id))
            .await?,
    ))
}

pub async fn cancel_resource_line(
    State(engine): State<LendingEngine>,
    ApiContext(ctx): ApiContext,
    Path((id, line_id)): Path<(i32, i32)>,
) -> Result<Json<LineRemoval>, ApiError> {
    Ok(Json(
        engine
            .cancel_request_line(&ctx, id, RequestLineRef::Resource(line_id))
            .await?,
    ))
}

pub async fn cancel_reservation_line(
    State(engine): State<LendingEngine>,
    ApiContext(ctx): ApiContext,
    Path((id, entry_id)): Path<(i32, i32)>,
) -> Result<Json<LineRemoval>, ApiError> {
    Ok(Json(
        engine
            .cancel_request_line(&ctx, id, RequestLineRef::Reservation(entry_id))
            .await?,
    ))
}

/// Convert the request into a loan record.
pub async fn fulfil_request(
    State(engine): State<LendingEngine>,
    ApiContext(ctx): ApiContext,
    Path(id): Path<i32>,
    Json(body): Json<FulfilBody>,
) -> Result<(StatusCode, Json<RecordSummary>), ApiError> {
    let summary = engine
        .process_request_to_record(&ctx, id, body.instance_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}
