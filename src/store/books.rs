//! Book Catalog Store: book records and their available-copy counts.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{offset, ts_from_db, ts_to_db};
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::types::{Book, CreateBookRequest};

const BOOK_COLUMNS: &str = "id, isbn, title, author, publisher, publication_year, genre, description, \
     total_copies, available_copies, created_at, updated_at";

/// Field changes for [`update`]. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct BookChanges {
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i64>,
    pub genre: Option<String>,
    pub description: Option<String>,
    pub total_copies: Option<i64>,
}

fn book_from_row(r: &SqliteRow) -> AppResult<Book> {
    Ok(Book {
        id: r.try_get("id")?,
        isbn: r.try_get("isbn")?,
        title: r.try_get("title")?,
        author: r.try_get("author")?,
        publisher: r.try_get("publisher")?,
        publication_year: r.try_get("publication_year")?,
        genre: r.try_get("genre")?,
        description: r.try_get("description")?,
        total_copies: r.try_get("total_copies")?,
        available_copies: r.try_get("available_copies")?,
        created_at: ts_from_db(r.try_get::<String, _>("created_at")?.as_str())?,
        updated_at: ts_from_db(r.try_get::<String, _>("updated_at")?.as_str())?,
    })
}

/// Inserts a book with every copy available. A taken ISBN is a `Conflict`.
///
/// Runs as a plain `execute` and re-reads the row, so the write is complete and visible to
/// other pool connections before this returns.
pub async fn insert(conn: &mut SqliteConnection, req: &CreateBookRequest, now: DateTime<Utc>) -> AppResult<Book> {
    let res = sqlx::query(
        r#"INSERT INTO books (isbn, title, author, publisher, publication_year, genre, description,
                              total_copies, available_copies, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?9, ?9)"#,
    )
    .bind(&req.isbn)
    .bind(&req.title)
    .bind(&req.author)
    .bind(&req.publisher)
    .bind(req.publication_year)
    .bind(&req.genre)
    .bind(&req.description)
    .bind(req.total_copies)
    .bind(ts_to_db(now))
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("book with this ISBN already exists".into())
        } else {
            e.into()
        }
    })?;
    find_by_id(conn, res.last_insert_rowid())
        .await?
        .ok_or_else(|| AppError::Database("inserted book vanished".into()))
}

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> AppResult<Option<Book>> {
    let sql = format!("SELECT {} FROM books WHERE id = ?1", BOOK_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    row.as_ref().map(book_from_row).transpose()
}

pub async fn find_by_isbn(conn: &mut SqliteConnection, isbn: &str) -> AppResult<Option<Book>> {
    let sql = format!("SELECT {} FROM books WHERE isbn = ?1", BOOK_COLUMNS);
    let row = sqlx::query(&sql).bind(isbn).fetch_optional(&mut *conn).await?;
    row.as_ref().map(book_from_row).transpose()
}

/// Applies `changes` in one statement.
///
/// A new `total_copies` shifts `available_copies` by the signed delta, floored at 0. Since
/// `available <= old_total`, the result never exceeds the new total.
pub async fn update(
    conn: &mut SqliteConnection,
    id: i64,
    changes: &BookChanges,
    now: DateTime<Utc>,
) -> AppResult<Option<Book>> {
    let res = sqlx::query(
        r#"UPDATE books SET
               title = COALESCE(?2, title),
               author = COALESCE(?3, author),
               publisher = COALESCE(?4, publisher),
               publication_year = COALESCE(?5, publication_year),
               genre = COALESCE(?6, genre),
               description = COALESCE(?7, description),
               available_copies = CASE WHEN ?8 IS NULL THEN available_copies
                                       ELSE MAX(0, available_copies + (?8 - total_copies)) END,
               total_copies = COALESCE(?8, total_copies),
               updated_at = ?9
           WHERE id = ?1"#,
    )
    .bind(id)
    .bind(&changes.title)
    .bind(&changes.author)
    .bind(&changes.publisher)
    .bind(changes.publication_year)
    .bind(&changes.genre)
    .bind(&changes.description)
    .bind(changes.total_copies)
    .bind(ts_to_db(now))
    .execute(&mut *conn)
    .await?;
    if res.rows_affected() == 0 {
        return Ok(None);
    }
    find_by_id(conn, id).await
}

/// Deletes the book only if no copy is out. Returns whether a row was deleted.
pub async fn delete_if_idle(conn: &mut SqliteConnection, id: i64) -> AppResult<bool> {
    let res = sqlx::query("DELETE FROM books WHERE id = ?1 AND available_copies = total_copies")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Lists books newest first, optionally filtered by a case-insensitive match on
/// title, author or ISBN.
pub async fn list(
    conn: &mut SqliteConnection,
    page: i64,
    limit: i64,
    search: Option<&str>,
) -> AppResult<(Vec<Book>, i64)> {
    let pattern = search.map(str::trim).filter(|s| !s.is_empty()).map(|s| format!("%{}%", escape_like(s)));
    let filter = r#"(?1 IS NULL OR title LIKE ?1 ESCAPE '\' OR author LIKE ?1 ESCAPE '\' OR isbn LIKE ?1 ESCAPE '\')"#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM books WHERE {}", filter))
        .bind(&pattern)
        .fetch_one(&mut *conn)
        .await?;

    let sql = format!(
        "SELECT {} FROM books WHERE {} ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
        BOOK_COLUMNS, filter
    );
    let rows = sqlx::query(&sql)
        .bind(&pattern)
        .bind(limit)
        .bind(offset(page, limit))
        .fetch_all(&mut *conn)
        .await?;
    let books = rows.iter().map(book_from_row).collect::<AppResult<Vec<_>>>()?;
    Ok((books, total))
}

/// Takes one copy off the shelf if any is left. `false` means none was available
/// (or the book does not exist).
pub async fn take_copy(conn: &mut SqliteConnection, id: i64, now: DateTime<Utc>) -> AppResult<bool> {
    let res = sqlx::query(
        "UPDATE books SET available_copies = available_copies - 1, updated_at = ?2 \
         WHERE id = ?1 AND available_copies > 0",
    )
    .bind(id)
    .bind(ts_to_db(now))
    .execute(&mut *conn)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Puts one copy back, capped at `total_copies`. `false` means the book does not exist.
pub async fn put_back_copy(conn: &mut SqliteConnection, id: i64, now: DateTime<Utc>) -> AppResult<bool> {
    let res = sqlx::query(
        "UPDATE books SET available_copies = MIN(available_copies + 1, total_copies), updated_at = ?2 \
         WHERE id = ?1",
    )
    .bind(id)
    .bind(ts_to_db(now))
    .execute(&mut *conn)
    .await?;
    Ok(res.rows_affected() > 0)
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("plain"), "plain");
    }
}
