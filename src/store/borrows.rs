//! Borrow Ledger Store: one row per checkout.
//!
//! Status is not stored. A row with `return_date IS NULL` is an active loan; it reads as
//! overdue once `due_date` has passed.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{offset, opt_ts_from_db, ts_from_db, ts_to_db};
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::policy::derive_status;
use crate::types::{BookSummary, BorrowRecord, UserSummary};

const RECORD_SELECT: &str = r#"SELECT r.id, r.user_id, r.book_id, r.borrow_date, r.due_date, r.return_date, r.fine,
           u.username AS u_username, u.email AS u_email,
           b.isbn AS b_isbn, b.title AS b_title, b.author AS b_author
    FROM borrow_records r
    LEFT JOIN users u ON u.id = r.user_id
    LEFT JOIN books b ON b.id = r.book_id"#;

fn record_from_row(r: &SqliteRow, now: DateTime<Utc>) -> AppResult<BorrowRecord> {
    let user_id: i64 = r.try_get("user_id")?;
    let book_id: i64 = r.try_get("book_id")?;
    let due_date = ts_from_db(r.try_get::<String, _>("due_date")?.as_str())?;
    let return_date = opt_ts_from_db(r.try_get("return_date")?)?;

    let user = match (r.try_get::<Option<String>, _>("u_username")?, r.try_get::<Option<String>, _>("u_email")?) {
        (Some(username), Some(email)) => Some(UserSummary { id: user_id, username, email }),
        _ => None,
    };
    let book = match (
        r.try_get::<Option<String>, _>("b_isbn")?,
        r.try_get::<Option<String>, _>("b_title")?,
        r.try_get::<Option<String>, _>("b_author")?,
    ) {
        (Some(isbn), Some(title), Some(author)) => Some(BookSummary { id: book_id, isbn, title, author }),
        _ => None,
    };

    Ok(BorrowRecord {
        id: r.try_get("id")?,
        user_id,
        book_id,
        borrow_date: ts_from_db(r.try_get::<String, _>("borrow_date")?.as_str())?,
        due_date,
        return_date,
        status: derive_status(due_date, return_date, now),
        fine: r.try_get::<Option<i64>, _>("fine")?.filter(|f| *f > 0),
        user,
        book,
    })
}

/// Creates an active loan and returns its id.
///
/// A second active loan of the same book by the same user violates the partial unique
/// index and comes back as `DuplicateBorrow`.
pub async fn insert(
    conn: &mut SqliteConnection,
    user_id: i64,
    book_id: i64,
    borrow_date: DateTime<Utc>,
    due_date: DateTime<Utc>,
) -> AppResult<i64> {
    let res = sqlx::query(
        r#"INSERT INTO borrow_records (user_id, book_id, borrow_date, due_date, created_at)
           VALUES (?1, ?2, ?3, ?4, ?3)"#,
    )
    .bind(user_id)
    .bind(book_id)
    .bind(ts_to_db(borrow_date))
    .bind(ts_to_db(due_date))
    .execute(&mut *conn)
    .await
    .map_err(|e| if is_unique_violation(&e) { AppError::DuplicateBorrow } else { e.into() })?;
    Ok(res.last_insert_rowid())
}

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64, now: DateTime<Utc>) -> AppResult<Option<BorrowRecord>> {
    let sql = format!("{} WHERE r.id = ?1", RECORD_SELECT);
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    row.as_ref().map(|r| record_from_row(r, now)).transpose()
}

/// Number of unreturned loans (borrowed or overdue) held by the user.
pub async fn count_active_by_user(conn: &mut SqliteConnection, user_id: i64) -> AppResult<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM borrow_records WHERE user_id = ?1 AND return_date IS NULL")
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(count)
}

/// Id of the user's unreturned loan of this book, if any.
pub async fn find_active_by_user_and_book(
    conn: &mut SqliteConnection,
    user_id: i64,
    book_id: i64,
) -> AppResult<Option<i64>> {
    let id: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM borrow_records WHERE user_id = ?1 AND book_id = ?2 AND return_date IS NULL LIMIT 1",
    )
    .bind(user_id)
    .bind(book_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(id)
}

/// Closes the loan exactly once. `false` means it was already returned (or is missing).
pub async fn mark_returned(
    conn: &mut SqliteConnection,
    id: i64,
    return_date: DateTime<Utc>,
    fine: i64,
) -> AppResult<bool> {
    let res = sqlx::query("UPDATE borrow_records SET return_date = ?2, fine = ?3 WHERE id = ?1 AND return_date IS NULL")
        .bind(id)
        .bind(ts_to_db(return_date))
        .bind(fine)
        .execute(&mut *conn)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// A user's full history, most recent first.
pub async fn list_by_user(
    conn: &mut SqliteConnection,
    user_id: i64,
    page: i64,
    limit: i64,
    now: DateTime<Utc>,
) -> AppResult<(Vec<BorrowRecord>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM borrow_records WHERE user_id = ?1")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
    let sql = format!(
        "{} WHERE r.user_id = ?1 ORDER BY r.borrow_date DESC, r.id DESC LIMIT ?2 OFFSET ?3",
        RECORD_SELECT
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(limit)
        .bind(offset(page, limit))
        .fetch_all(&mut *conn)
        .await?;
    let records = rows.iter().map(|r| record_from_row(r, now)).collect::<AppResult<Vec<_>>>()?;
    Ok((records, total))
}

/// All unreturned loans, soonest due first.
pub async fn list_active(
    conn: &mut SqliteConnection,
    page: i64,
    limit: i64,
    now: DateTime<Utc>,
) -> AppResult<(Vec<BorrowRecord>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM borrow_records WHERE return_date IS NULL")
        .fetch_one(&mut *conn)
        .await?;
    let sql = format!(
        "{} WHERE r.return_date IS NULL ORDER BY r.due_date ASC, r.id ASC LIMIT ?1 OFFSET ?2",
        RECORD_SELECT
    );
    let rows = sqlx::query(&sql).bind(limit).bind(offset(page, limit)).fetch_all(&mut *conn).await?;
    let records = rows.iter().map(|r| record_from_row(r, now)).collect::<AppResult<Vec<_>>>()?;
    Ok((records, total))
}

/// Unreturned loans whose due date is before `now`, soonest due first.
pub async fn list_overdue(
    conn: &mut SqliteConnection,
    page: i64,
    limit: i64,
    now: DateTime<Utc>,
) -> AppResult<(Vec<BorrowRecord>, i64)> {
    let now_db = ts_to_db(now);
    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM borrow_records WHERE return_date IS NULL AND due_date < ?1")
            .bind(&now_db)
            .fetch_one(&mut *conn)
            .await?;
    let sql = format!(
        "{} WHERE r.return_date IS NULL AND r.due_date < ?1 ORDER BY r.due_date ASC, r.id ASC LIMIT ?2 OFFSET ?3",
        RECORD_SELECT
    );
    let rows = sqlx::query(&sql)
        .bind(&now_db)
        .bind(limit)
        .bind(offset(page, limit))
        .fetch_all(&mut *conn)
        .await?;
    let records = rows.iter().map(|r| record_from_row(r, now)).collect::<AppResult<Vec<_>>>()?;
    Ok((records, total))
}
