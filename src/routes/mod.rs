//! HTTP route handlers for the Libris API.
//!
//! - `auth`: registration, login, logout and the current user
//! - `books`: catalog browsing and staff catalog management
//! - `borrows`: checkout, return, fines and loan listings
//! - `health`: liveness, readiness, metrics and version
//! - `users`: admin user management

pub mod auth;
pub mod books;
pub mod borrows;
pub mod health;
pub mod users;

use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::error::{AppError, AppResult};

/// Unwraps a JSON body, turning axum's rejection into the API error envelope.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload.map(|Json(body)| body).map_err(|e| AppError::BadRequest(e.body_text()))
}
