//! SQLite-backed stores.
//!
//! Every function takes a `&mut SqliteConnection` so the same call works on a pooled
//! connection or inside a transaction (`&mut *tx`). Mutations that guard an invariant are
//! single conditional statements and report whether a row matched.

pub mod books;
pub mod borrows;
pub mod sessions;
pub mod users;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{AppError, AppResult};

/// Fixed-width UTC timestamp, so text comparison in SQL matches time order.
pub fn ts_to_db(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn ts_from_db(raw: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Database(format!("invalid timestamp '{}' in store: {}", raw, e)))
}

pub fn opt_ts_from_db(raw: Option<String>) -> AppResult<Option<DateTime<Utc>>> {
    raw.as_deref().map(ts_from_db).transpose()
}

/// Row offset for a 1-based page, saturating at `i64::MAX` for absurd page numbers.
pub fn offset(page: i64, limit: i64) -> i64 {
    (page.max(1) - 1).saturating_mul(limit.max(0))
}
