use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// The primary error type for the application.
///
/// The lending variants (`Unavailable` through `AlreadyReturned`) are business-rule
/// rejections; `Database` is a store failure and is always surfaced.
#[derive(Debug, Error)]
pub enum AppError {
    /// For internal server errors that are not expected to be handled by the client.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
    /// For client errors due to invalid requests.
    #[error("Bad request: {0}")]
    BadRequest(String),
    /// A user, book or borrow record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// For when a request conflicts with the current state of the server.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// A book has no copies left or the borrower's account is deactivated.
    #[error("Unavailable: {0}")]
    Unavailable(String),
    /// The borrower already holds the maximum number of active loans.
    #[error("Borrow limit exceeded: user has reached maximum borrow limit of {limit} books")]
    LimitExceeded { limit: i64 },
    /// The borrower already holds an active loan of this book.
    #[error("Duplicate borrow: user has already borrowed this book")]
    DuplicateBorrow,
    /// The caller may not act on this resource.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    /// The borrow record has already been returned.
    #[error("Already returned: book already returned")]
    AlreadyReturned,
    /// For errors related to database operations.
    #[error("Database error: {0}")]
    Database(String),
    /// For when a request carries no valid credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// For when a client has sent too many requests in a given amount of time.
    #[error("Rate limited. Retry after {retry_after_seconds} seconds")]
    RateLimited {
        /// The number of seconds to wait before retrying the request.
        retry_after_seconds: u64,
    },
    /// For when a specific field in a request fails validation.
    #[error("Validation error on field '{field}': {message}")]
    ValidationError {
        /// The name of the field that failed validation.
        field: String,
        /// A message describing the validation error.
        message: String,
    },
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::ValidationError { field: field.to_string(), message: message.into() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message, details) = match self {
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                let error_id = uuid::Uuid::new_v4();
                tracing::error!("Error ID: {}", error_id);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    Some(json!({ "error_id": error_id.to_string() })),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg, None),
            AppError::Unavailable(msg) => (StatusCode::CONFLICT, "UNAVAILABLE", msg, None),
            AppError::LimitExceeded { limit } => (
                StatusCode::CONFLICT,
                "LIMIT_EXCEEDED",
                format!("user has reached maximum borrow limit of {} books", limit),
                Some(json!({ "limit": limit })),
            ),
            AppError::DuplicateBorrow => (
                StatusCode::CONFLICT,
                "DUPLICATE_BORROW",
                "user has already borrowed this book".to_string(),
                None,
            ),
            AppError::NotAuthorized(msg) => (StatusCode::FORBIDDEN, "NOT_AUTHORIZED", msg, None),
            AppError::AlreadyReturned => {
                (StatusCode::CONFLICT, "ALREADY_RETURNED", "book already returned".to_string(), None)
            }
            AppError::Database(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    Some(json!({ "details": msg })),
                )
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg, None),
            AppError::RateLimited { retry_after_seconds } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                format!("Too many requests. Please retry after {} seconds", retry_after_seconds),
                Some(json!({ "retry_after_seconds": retry_after_seconds })),
            ),
            AppError::ValidationError { field, message } => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("Validation failed for field '{}'", field),
                Some(json!({ "field": field, "message": message })),
            ),
        };

        let mut body = json!({
            "error": {
                "code": error_code,
                "message": error_message,
            },
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        if let Some(details) = details {
            body["error"]["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
            sqlx::Error::PoolTimedOut => AppError::Database("connection pool timed out".to_string()),
            _ => AppError::Database(format!("Database error: {}", err)),
        }
    }
}

/// True if the error is a UNIQUE constraint violation reported by SQLite.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// A type alias for `Result<T, AppError>`, used throughout the application.
pub type AppResult<T> = Result<T, AppError>;

/// An extension trait for `Option` that provides a convenient way to convert
/// an `Option` to a `Result` with a `NotFound` error.
pub trait OptionExt<T> {
    /// Converts `None` into `AppError::NotFound("<entity> not found")`.
    fn ok_or_not_found(self, entity: &str) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(format!("{} not found", entity)))
    }
}
