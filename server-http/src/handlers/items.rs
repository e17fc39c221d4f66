use crate::error::ApiError;
use crate::models::{BatchRequest, BatchResponse};
use crate::state::AppState;
use crate::validation::{validate_batch, validate_item_path};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use dismissible::domain::response::{GetOrCreateResponse, TransitionResponse};
use dismissible::planes::data::LifecycleOperations;
use tracing::info;

/// GET /v1/users/:user_id/items/:item_id
pub async fn get_or_create_item(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<GetOrCreateResponse>), ApiError> {
    validate_item_path(&user_id, &item_id)?;

    let response = state
        .lifecycle
        .get_or_create(&user_id, &item_id, None)
        .await?;

    let status = if response.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(response)))
}

/// POST /v1/users/:user_id/items
pub async fn get_or_create_items(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    validate_batch(&user_id, &req.item_ids)?;
    info!("BATCH: user={}, items={}", user_id, req.item_ids.len());

    let items = state
        .lifecycle
        .get_or_create_many(&user_id, &req.item_ids, req.context)
        .await?;

    Ok(Json(BatchResponse { items }))
}

/// DELETE /v1/users/:user_id/items/:item_id
pub async fn dismiss_item(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(String, String)>,
) -> Result<Json<TransitionResponse>, ApiError> {
    validate_item_path(&user_id, &item_id)?;

    let response = state.lifecycle.dismiss(&user_id, &item_id, None).await?;
    Ok(Json(response))
}

/// POST /v1/users/:user_id/items/:item_id
pub async fn restore_item(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(String, String)>,
) -> Result<Json<TransitionResponse>, ApiError> {
    validate_item_path(&user_id, &item_id)?;

    let response = state.lifecycle.restore(&user_id, &item_id, None).await?;
    Ok(Json(response))
}
