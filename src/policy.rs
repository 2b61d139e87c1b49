//! Due-date, status and fine rules for loans.
//!
//! Everything here is a pure function of its inputs; callers pass `now` explicitly so the
//! rules can be evaluated against a fixed clock.

use chrono::{DateTime, Duration, Utc};

use crate::types::BorrowStatus;

/// Borrowing rules sourced from the `[lending]` configuration section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LendingPolicy {
    /// Maximum number of active loans a user may hold at once.
    pub max_books_per_user: i64,
    /// Loan period applied when the borrower supplies no due date.
    pub borrow_days: i64,
    /// Fine per whole day overdue, in currency units.
    pub fine_per_day: i64,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self { max_books_per_user: 5, borrow_days: 14, fine_per_day: 1000 }
    }
}

impl LendingPolicy {
    /// The supplied due date, or `borrow_date + borrow_days`.
    pub fn due_date(&self, borrow_date: DateTime<Utc>, requested: Option<DateTime<Utc>>) -> DateTime<Utc> {
        requested.unwrap_or_else(|| borrow_date + Duration::days(self.borrow_days))
    }

    /// Fine owed for a loan as of `now`.
    ///
    /// Zero for returned loans and loans not yet past due. Otherwise the number of whole
    /// 24-hour periods elapsed since the due date, times `fine_per_day`.
    pub fn fine(&self, due_date: DateTime<Utc>, return_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
        if return_date.is_some() || now <= due_date {
            return 0;
        }
        let overdue_days = (now - due_date).num_hours() / 24;
        overdue_days.max(0) * self.fine_per_day
    }
}

/// Status of a loan as observed at `now`.
pub fn derive_status(
    due_date: DateTime<Utc>,
    return_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> BorrowStatus {
    match return_date {
        Some(_) => BorrowStatus::Returned,
        None if now > due_date => BorrowStatus::Overdue,
        None => BorrowStatus::Borrowed,
    }
}

/// Corrects out-of-range pagination input instead of rejecting it.
///
/// `page` below 1 becomes 1; a `limit` outside `1..=max_limit` falls back to 10.
pub fn normalize_page(page: Option<i64>, limit: Option<i64>, max_limit: i64) -> (i64, i64) {
    let page = page.filter(|p| *p >= 1).unwrap_or(1);
    let limit = limit.filter(|l| (1..=max_limit).contains(l)).unwrap_or(DEFAULT_PAGE_LIMIT);
    (page, limit)
}

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
