use axum::{
    extract::{Path, State},
    Json,
};

use super::error::{ApiContext, ApiError};
use crate::domain::ReservationNotice;
use crate::models::inventory;
use crate::services::{LendingEngine, SweepReport};

pub async fn item_counters(
    State(engine): State<LendingEngine>,
    Path(item_id): Path<i32>,
) -> Result<Json<inventory::Model>, ApiError> {
    Ok(Json(engine.inventory(item_id).await?))
}

/// Put a returned copy back on the shelf.
pub async fn shelve_instance(
    State(engine): State<LendingEngine>,
    ApiContext(ctx): ApiContext,
    Path(instance_id): Path<i32>,
) -> Result<Json<Option<ReservationNotice>>, ApiError> {
    Ok(Json(engine.shelve_instance(&ctx, instance_id).await?))
}

pub async fn run_sweep(
    State(engine): State<LendingEngine>,
    ApiContext(ctx): ApiContext,
) -> Result<Json<SweepReport>, ApiError> {
    Ok(Json(engine.sweep(&ctx).await?))
}
