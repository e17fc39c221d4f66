use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::validate_item_path;
use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use dismissible::planes::control::AdminOperations;

/// DELETE /admin/users/:user_id/items/:item_id
pub async fn delete_item(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    validate_item_path(&user_id, &item_id)?;

    state.admin.delete_item(&user_id, &item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /admin/items
pub async fn reset_items(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.admin.reset().await?;
    Ok(StatusCode::NO_CONTENT)
}
