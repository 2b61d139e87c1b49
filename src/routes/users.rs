use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::IntoResponse,
    Json,
};

use super::json_body;
use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::state::AppState;
use crate::types::{PageQuery, UpdateUserRequest};

pub async fn list_users(State(state): State<AppState>, Query(q): Query<PageQuery>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.accounts.list_users(q.page, q.limit).await?))
}

pub async fn get_user(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.accounts.get_user(id).await?))
}

pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let req = json_body(payload)?;
    if req.role.is_none() && req.is_active.is_none() {
        return Err(AppError::BadRequest("nothing to update: supply role and/or is_active".into()));
    }
    // Self-demotion and self-deactivation are refused.
    if id == admin.id && (req.is_active == Some(false) || req.role.is_some_and(|r| r != admin.role)) {
        return Err(AppError::Conflict("admins cannot demote or deactivate themselves".into()));
    }
    Ok(Json(state.accounts.update_user(id, req).await?))
}
