//! User Directory: identity, role and the active flag.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{offset, ts_from_db, ts_to_db};
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::types::{Role, User};

pub(crate) const USER_COLUMNS: &str = "id, username, email, role, is_active, created_at";

pub(crate) fn user_from_row(r: &SqliteRow) -> AppResult<User> {
    let role: String = r.try_get("role")?;
    Ok(User {
        id: r.try_get("id")?,
        username: r.try_get("username")?,
        email: r.try_get("email")?,
        role: role.parse::<Role>().map_err(AppError::Database)?,
        is_active: r.try_get("is_active")?,
        created_at: ts_from_db(r.try_get::<String, _>("created_at")?.as_str())?,
    })
}

pub async fn insert(
    conn: &mut SqliteConnection,
    username: &str,
    email: &str,
    password_hash: &str,
    role: Role,
    now: DateTime<Utc>,
) -> AppResult<User> {
    let res = sqlx::query(
        r#"INSERT INTO users (username, email, password_hash, role, is_active, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)"#,
    )
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(role.as_str())
    .bind(ts_to_db(now))
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("username or email already exists".into())
        } else {
            e.into()
        }
    })?;
    find_by_id(conn, res.last_insert_rowid())
        .await?
        .ok_or_else(|| AppError::Database("inserted user vanished".into()))
}

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> AppResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    row.as_ref().map(user_from_row).transpose()
}

pub async fn find_by_username(conn: &mut SqliteConnection, username: &str) -> AppResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS);
    let row = sqlx::query(&sql).bind(username).fetch_optional(&mut *conn).await?;
    row.as_ref().map(user_from_row).transpose()
}

pub async fn find_by_email(conn: &mut SqliteConnection, email: &str) -> AppResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS);
    let row = sqlx::query(&sql).bind(email).fetch_optional(&mut *conn).await?;
    row.as_ref().map(user_from_row).transpose()
}

/// Looks a user up by username, then by email, returning the stored password hash too.
pub async fn find_credentials(conn: &mut SqliteConnection, login: &str) -> AppResult<Option<(User, String)>> {
    let sql = format!(
        "SELECT {}, password_hash FROM users WHERE username = ?1 \
         UNION ALL SELECT {}, password_hash FROM users WHERE email = ?1 AND username <> ?1 \
         LIMIT 1",
        USER_COLUMNS, USER_COLUMNS
    );
    let row = sqlx::query(&sql).bind(login).fetch_optional(&mut *conn).await?;
    match row {
        Some(r) => {
            let hash: String = r.try_get("password_hash")?;
            Ok(Some((user_from_row(&r)?, hash)))
        }
        None => Ok(None),
    }
}

pub async fn list(conn: &mut SqliteConnection, page: i64, limit: i64) -> AppResult<(Vec<User>, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&mut *conn).await?;
    let sql = format!("SELECT {} FROM users ORDER BY id ASC LIMIT ?1 OFFSET ?2", USER_COLUMNS);
    let rows = sqlx::query(&sql).bind(limit).bind(offset(page, limit)).fetch_all(&mut *conn).await?;
    let users = rows.iter().map(user_from_row).collect::<AppResult<Vec<_>>>()?;
    Ok((users, total))
}

/// Changes role and/or active flag. `None` keeps the current value.
pub async fn update_access(
    conn: &mut SqliteConnection,
    id: i64,
    role: Option<Role>,
    is_active: Option<bool>,
    now: DateTime<Utc>,
) -> AppResult<Option<User>> {
    let res = sqlx::query(
        "UPDATE users SET role = COALESCE(?2, role), is_active = COALESCE(?3, is_active), updated_at = ?4 \
         WHERE id = ?1",
    )
    .bind(id)
    .bind(role.map(|r| r.as_str()))
    .bind(is_active)
    .bind(ts_to_db(now))
    .execute(&mut *conn)
    .await?;
    if res.rows_affected() == 0 {
        return Ok(None);
    }
    find_by_id(conn, id).await
}
