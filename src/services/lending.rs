//! Borrowing workflow: checkout, return, fines and loan listings.
//!
//! Both mutations run as a single SQLite transaction whose first statement is a write, so
//! the copy count and the ledger either change together or not at all. The read-only
//! precondition checks run beforehand and decide which rejection the caller sees.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::{AppError, AppResult, OptionExt};
use crate::metrics::Metrics;
use crate::policy::{normalize_page, LendingPolicy};
use crate::store::{books, borrows, users};
use crate::types::{BorrowRecord, BorrowStatus, Paginated, User};

/// Largest page size for loan listings.
pub const MAX_BORROW_PAGE_LIMIT: i64 = 50;

#[derive(Clone)]
pub struct LendingService {
    db: SqlitePool,
    policy: LendingPolicy,
    metrics: Metrics,
}

impl LendingService {
    pub fn new(db: SqlitePool, policy: LendingPolicy, metrics: Metrics) -> Self {
        Self { db, policy, metrics }
    }

    pub fn policy(&self) -> &LendingPolicy {
        &self.policy
    }

    pub async fn borrow(
        &self,
        user_id: i64,
        book_id: i64,
        due_date: Option<DateTime<Utc>>,
    ) -> AppResult<BorrowRecord> {
        self.borrow_at(user_id, book_id, due_date, Utc::now()).await
    }

    /// Checks out one copy of `book_id` to `user_id` as of `now`.
    ///
    /// Rejections, in the order they are checked: missing user, deactivated user, missing
    /// book, no copy left, borrow limit reached, same book already out to this user.
    pub async fn borrow_at(
        &self,
        user_id: i64,
        book_id: i64,
        due_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowRecord> {
        let result = self.try_borrow(user_id, book_id, due_date, now).await;
        match &result {
            Ok(record) => {
                self.metrics.inc_borrowed();
                info!(
                    borrow_id = record.id,
                    user_id,
                    book_id,
                    due_date = %record.due_date,
                    "Book borrowed"
                );
            }
            Err(AppError::Database(_)) | Err(AppError::Internal(_)) => {}
            Err(e) => {
                self.metrics.inc_borrow_rejections();
                warn!(user_id, book_id, "Borrow rejected: {}", e);
            }
        }
        result
    }

    async fn try_borrow(
        &self,
        user_id: i64,
        book_id: i64,
        due_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowRecord> {
        let limit = self.policy.max_books_per_user;
        {
            let mut conn = self.db.acquire().await?;

            let user = users::find_by_id(&mut conn, user_id).await?.ok_or_not_found("user")?;
            if !user.is_active {
                return Err(AppError::Unavailable("user account is deactivated".into()));
            }

            let book = books::find_by_id(&mut conn, book_id).await?.ok_or_not_found("book")?;
            if !book.can_borrow() {
                return Err(AppError::Unavailable("book is not available for borrowing".into()));
            }

            if borrows::count_active_by_user(&mut conn, user_id).await? >= limit {
                return Err(AppError::LimitExceeded { limit });
            }

            if borrows::find_active_by_user_and_book(&mut conn, user_id, book_id).await?.is_some() {
                return Err(AppError::DuplicateBorrow);
            }
        }

        let due_date = self.policy.due_date(now, due_date);

        // The decrement comes first so the transaction holds the write lock before it
        // re-reads anything; dropping `tx` on an early return rolls it back.
        let mut tx = self.db.begin().await?;
        if !books::take_copy(&mut tx, book_id, now).await? {
            return Err(AppError::Unavailable("book is not available for borrowing".into()));
        }
        if borrows::count_active_by_user(&mut tx, user_id).await? >= limit {
            return Err(AppError::LimitExceeded { limit });
        }
        let id = borrows::insert(&mut tx, user_id, book_id, now, due_date).await?;
        let record = borrows::find_by_id(&mut tx, id, now).await?.ok_or_not_found("borrow record")?;
        tx.commit().await?;
        Ok(record)
    }

    pub async fn return_book(&self, user_id: i64, record_id: i64) -> AppResult<(BorrowRecord, i64)> {
        self.return_book_at(user_id, record_id, Utc::now()).await
    }

    /// Closes the loan `record_id` on behalf of its owner and assesses the fine.
    ///
    /// Returns the updated record and the fine (0 when returned on time).
    pub async fn return_book_at(
        &self,
        user_id: i64,
        record_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<(BorrowRecord, i64)> {
        let record = {
            let mut conn = self.db.acquire().await?;
            let record = borrows::find_by_id(&mut conn, record_id, now).await?.ok_or_not_found("borrow record")?;
            if record.user_id != user_id {
                return Err(AppError::NotAuthorized("not authorized to return this book".into()));
            }
            if record.return_date.is_some() {
                return Err(AppError::AlreadyReturned);
            }
            books::find_by_id(&mut conn, record.book_id).await?.ok_or_not_found("book")?;
            record
        };

        let fine = self.policy.fine(record.due_date, None, now);

        let mut tx = self.db.begin().await?;
        if !borrows::mark_returned(&mut tx, record_id, now, fine).await? {
            return Err(AppError::AlreadyReturned);
        }
        if !books::put_back_copy(&mut tx, record.book_id, now).await? {
            return Err(AppError::NotFound("book not found".into()));
        }
        let updated = borrows::find_by_id(&mut tx, record_id, now).await?.ok_or_not_found("borrow record")?;
        tx.commit().await?;

        self.metrics.inc_returned();
        self.metrics.add_fine(fine);
        info!(borrow_id = record_id, user_id, book_id = record.book_id, fine, "Book returned");
        Ok((updated, fine))
    }

    pub async fn fine_for(&self, requester: &User, record_id: i64) -> AppResult<(BorrowRecord, i64)> {
        self.fine_for_at(requester, record_id, Utc::now()).await
    }

    /// Current fine for a loan: accrued so far if unreturned, assessed if returned.
    /// Visible to the borrower and to staff.
    pub async fn fine_for_at(
        &self,
        requester: &User,
        record_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<(BorrowRecord, i64)> {
        let mut conn = self.db.acquire().await?;
        let record = borrows::find_by_id(&mut conn, record_id, now).await?.ok_or_not_found("borrow record")?;
        if record.user_id != requester.id && !requester.role.is_staff() {
            return Err(AppError::NotAuthorized("not authorized to view this borrow record".into()));
        }
        let record = self.with_accrued_fine(record, now);
        let fine = record.fine.unwrap_or(0);
        Ok((record, fine))
    }

    /// The user's loans, most recent first.
    pub async fn user_history(
        &self,
        user_id: i64,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> AppResult<Paginated<BorrowRecord>> {
        let now = Utc::now();
        let (page, limit) = normalize_page(page, limit, MAX_BORROW_PAGE_LIMIT);
        let mut conn = self.db.acquire().await?;
        let (records, total) = borrows::list_by_user(&mut conn, user_id, page, limit, now).await?;
        Ok(self.page_of(records, page, limit, total, now))
    }

    /// All unreturned loans, overdue ones included.
    pub async fn active(&self, page: Option<i64>, limit: Option<i64>) -> AppResult<Paginated<BorrowRecord>> {
        let now = Utc::now();
        let (page, limit) = normalize_page(page, limit, MAX_BORROW_PAGE_LIMIT);
        let mut conn = self.db.acquire().await?;
        let (records, total) = borrows::list_active(&mut conn, page, limit, now).await?;
        Ok(self.page_of(records, page, limit, total, now))
    }

    pub async fn overdue(&self, page: Option<i64>, limit: Option<i64>) -> AppResult<Paginated<BorrowRecord>> {
        self.overdue_at(page, limit, Utc::now()).await
    }

    pub async fn overdue_at(
        &self,
        page: Option<i64>,
        limit: Option<i64>,
        now: DateTime<Utc>,
    ) -> AppResult<Paginated<BorrowRecord>> {
        let (page, limit) = normalize_page(page, limit, MAX_BORROW_PAGE_LIMIT);
        let mut conn = self.db.acquire().await?;
        let (records, total) = borrows::list_overdue(&mut conn, page, limit, now).await?;
        Ok(self.page_of(records, page, limit, total, now))
    }

    fn page_of(
        &self,
        records: Vec<BorrowRecord>,
        page: i64,
        limit: i64,
        total: i64,
        now: DateTime<Utc>,
    ) -> Paginated<BorrowRecord> {
        let records = records.into_iter().map(|r| self.with_accrued_fine(r, now)).collect();
        Paginated::new(records, page, limit, total)
    }

    fn with_accrued_fine(&self, mut record: BorrowRecord, now: DateTime<Utc>) -> BorrowRecord {
        if record.status == BorrowStatus::Overdue {
            let accrued = self.policy.fine(record.due_date, record.return_date, now);
            record.fine = Some(accrued).filter(|f| *f > 0);
        }
        record
    }
}
