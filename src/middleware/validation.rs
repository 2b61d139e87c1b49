use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Datelike, Utc};
use serde_json::json;

use crate::error::{AppError, AppResult};

/// Default cap for request bodies; JSON payloads here are tiny.
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// An Axum middleware that rejects oversized bodies early and flags scanner traffic.
///
/// `DefaultBodyLimit` still enforces the limit on the actual body; this only looks at the
/// declared `Content-Length` so obviously oversized requests never reach a handler.
pub async fn validate_request_middleware(req: Request, next: Next) -> Response {
    if let Some(user_agent) = req.headers().get("user-agent") {
        if let Ok(ua_str) = user_agent.to_str() {
            if is_suspicious_user_agent(ua_str) {
                tracing::warn!("Suspicious user agent detected: {}", sanitize_for_logging(ua_str));
            }
        }
    }

    if matches!(req.method(), &axum::http::Method::POST | &axum::http::Method::PUT | &axum::http::Method::PATCH) {
        if let Some(length) = req
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<usize>().ok())
        {
            let max_body_size = max_body_size();
            if length > max_body_size {
                return (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    Json(json!({
                        "error": {
                            "code": "PAYLOAD_TOO_LARGE",
                            "message": format!("Request body exceeds maximum size of {} bytes", max_body_size),
                        },
                        "status": 413,
                    })),
                )
                    .into_response();
            }
        }
    }

    next.run(req).await
}

/// Body limit, overridable via `LIBRIS_MAX_BODY_SIZE` (clamped to 16 KiB..=10 MiB).
pub fn max_body_size() -> usize {
    std::env::var("LIBRIS_MAX_BODY_SIZE")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_MAX_BODY_SIZE)
        .clamp(16 * 1024, 10 * 1024 * 1024)
}

fn is_suspicious_user_agent(ua: &str) -> bool {
    let ua_lower = ua.to_lowercase();
    ua_lower.contains("nikto")
        || ua_lower.contains("sqlmap")
        || ua_lower.contains("havij")
        || ua_lower.contains("acunetix")
        || ua_lower.contains("masscan")
}

/// ISBN-10 or ISBN-13: digits only, except a trailing `X` check digit on ISBN-10.
/// Hyphens and spaces are ignored.
pub fn normalize_isbn(raw: &str) -> AppResult<String> {
    let isbn: String = raw.chars().filter(|c| *c != '-' && !c.is_whitespace()).collect::<String>().to_uppercase();
    let len = isbn.len();
    if !(10..=13).contains(&len) {
        return Err(AppError::validation("isbn", "ISBN must be 10 to 13 characters long"));
    }
    let valid = isbn
        .char_indices()
        .all(|(i, c)| c.is_ascii_digit() || (c == 'X' && i == len - 1 && len == 10));
    if !valid {
        return Err(AppError::validation("isbn", "ISBN may only contain digits (and a final X)"));
    }
    Ok(isbn)
}

pub fn validate_required(value: &str, field: &str, max_len: usize) -> AppResult<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(field, "must not be empty"));
    }
    if trimmed.chars().count() > max_len {
        return Err(AppError::validation(field, format!("must be at most {} characters", max_len)));
    }
    Ok(())
}

pub fn validate_publication_year(year: i64) -> AppResult<()> {
    let current = i64::from(Utc::now().year());
    if !(1000..=current).contains(&year) {
        return Err(AppError::validation("publication_year", format!("must be between 1000 and {}", current)));
    }
    Ok(())
}

pub fn validate_total_copies(total: i64) -> AppResult<()> {
    if total < 1 {
        return Err(AppError::validation("total_copies", format!("must be at least 1, got {}", total)));
    }
    Ok(())
}

pub fn validate_username(username: &str) -> AppResult<()> {
    let len = username.chars().count();
    if !(3..=50).contains(&len) {
        return Err(AppError::validation("username", "must be 3-50 characters"));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')) {
        return Err(AppError::validation("username", "may only contain letters, digits, '_', '-' and '.'"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> AppResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if !valid || email.len() > 100 || email.chars().any(char::is_whitespace) {
        return Err(AppError::validation("email", "invalid email format"));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < 6 {
        return Err(AppError::validation("password", "must be at least 6 characters"));
    }
    Ok(())
}

/// Sanitizes user input for logging purposes.
///
/// Removes control characters, limits the length to 200 characters and escapes quotes.
pub fn sanitize_for_logging(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .take(200)
        .collect::<String>()
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\'', "\\\'")
}
