use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use super::json_body;
use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::state::AppState;
use crate::types::{
    BorrowBookRequest, BorrowResponse, FineResponse, PageQuery, ReturnBookRequest, ReturnResponse, User,
};

/// Whose loan this is: the caller, or for staff, the user named in the request.
fn borrower_id(actor: &User, requested: Option<i64>) -> AppResult<i64> {
    match requested {
        Some(id) if id != actor.id => {
            if actor.role.is_staff() {
                Ok(id)
            } else {
                Err(AppError::NotAuthorized("members may only borrow for themselves".into()))
            }
        }
        _ => Ok(actor.id),
    }
}

pub async fn borrow_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<BorrowBookRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let req = json_body(payload)?;
    if req.book_id <= 0 {
        return Err(AppError::validation("book_id", "must be a positive id"));
    }
    let borrower = borrower_id(&user, req.user_id)?;

    let record = state.lending.borrow(borrower, req.book_id, req.due_date).await?;
    Ok((
        StatusCode::CREATED,
        Json(BorrowResponse { message: "book borrowed successfully".into(), data: record }),
    ))
}

pub async fn return_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<ReturnBookRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let req = json_body(payload)?;
    if req.borrow_record_id <= 0 {
        return Err(AppError::validation("borrow_record_id", "must be a positive id"));
    }
    let (record, fine) = state.lending.return_book(user.id, req.borrow_record_id).await?;
    Ok(Json(ReturnResponse {
        message: "book returned successfully".into(),
        data: record,
        fine: Some(fine).filter(|f| *f > 0),
    }))
}

pub async fn my_books(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<PageQuery>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.lending.user_history(user.id, q.page, q.limit).await?))
}

pub async fn fine(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let (record, fine) = state.lending.fine_for(&user, id).await?;
    Ok(Json(FineResponse { borrow_record_id: record.id, status: record.status, fine }))
}

pub async fn active_borrows(State(state): State<AppState>, Query(q): Query<PageQuery>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.lending.active(q.page, q.limit).await?))
}

pub async fn overdue_borrows(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.lending.overdue(q.page, q.limit).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use chrono::Utc;

    fn user(id: i64, role: Role) -> User {
        User {
            id,
            username: format!("user{}", id),
            email: format!("user{}@example.org", id),
            role,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_borrower_defaults_to_caller() {
        assert_eq!(borrower_id(&user(3, Role::Member), None).unwrap(), 3);
        assert_eq!(borrower_id(&user(3, Role::Member), Some(3)).unwrap(), 3);
    }

    #[test]
    fn test_only_staff_borrow_on_behalf() {
        assert_eq!(borrower_id(&user(1, Role::Librarian), Some(9)).unwrap(), 9);
        assert_eq!(borrower_id(&user(1, Role::Admin), Some(9)).unwrap(), 9);
        assert!(matches!(borrower_id(&user(3, Role::Member), Some(9)), Err(AppError::NotAuthorized(_))));
    }
}
