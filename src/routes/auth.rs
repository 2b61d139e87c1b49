use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use super::json_body;
use crate::error::AppResult;
use crate::middleware::{CurrentUser, SessionToken};
use crate::state::AppState;
use crate::types::{LoginRequest, RegisterRequest};

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let user = state.accounts.register(json_body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let res = state.accounts.login(json_body(payload)?).await?;
    Ok(Json(res))
}

pub async fn logout(State(state): State<AppState>, SessionToken(token): SessionToken) -> AppResult<impl IntoResponse> {
    state.accounts.logout(&token).await?;
    Ok(Json(json!({ "message": "logged out" })))
}

pub async fn me(CurrentUser(user): CurrentUser) -> impl IntoResponse {
    Json(user)
}
