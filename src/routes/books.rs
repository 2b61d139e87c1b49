use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use super::json_body;
use crate::error::AppResult;
use crate::state::AppState;
use crate::types::{BookListQuery, CreateBookRequest, UpdateBookRequest};

pub async fn list_books(State(state): State<AppState>, Query(q): Query<BookListQuery>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.catalog.list(q).await?))
}

pub async fn get_book(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.catalog.get(id).await?))
}

pub async fn availability(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.catalog.check_availability(id).await?))
}

pub async fn create_book(
    State(state): State<AppState>,
    payload: Result<Json<CreateBookRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let book = state.catalog.create(json_body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateBookRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.catalog.update(id, json_body(payload)?).await?))
}

pub async fn delete_book(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<impl IntoResponse> {
    state.catalog.delete(id).await?;
    Ok(Json(json!({ "message": "book deleted successfully" })))
}
