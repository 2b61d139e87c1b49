//! Opaque bearer-token sessions.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::ts_to_db;
use super::users::{user_from_row, USER_COLUMNS};
use crate::error::AppResult;
use crate::types::User;

pub async fn create(
    conn: &mut SqliteConnection,
    token: &str,
    user_id: i64,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> AppResult<()> {
    sqlx::query("INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)")
        .bind(token)
        .bind(user_id)
        .bind(ts_to_db(now))
        .bind(ts_to_db(expires_at))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// The user owning an unexpired session.
pub async fn find_user(conn: &mut SqliteConnection, token: &str, now: DateTime<Utc>) -> AppResult<Option<User>> {
    let columns = USER_COLUMNS.split(", ").map(|c| format!("u.{}", c)).collect::<Vec<_>>().join(", ");
    let sql = format!(
        "SELECT {} FROM sessions s JOIN users u ON u.id = s.user_id WHERE s.token = ?1 AND s.expires_at > ?2",
        columns
    );
    let row = sqlx::query(&sql).bind(token).bind(ts_to_db(now)).fetch_optional(&mut *conn).await?;
    row.as_ref().map(user_from_row).transpose()
}

pub async fn delete(conn: &mut SqliteConnection, token: &str) -> AppResult<bool> {
    let res = sqlx::query("DELETE FROM sessions WHERE token = ?1").bind(token).execute(&mut *conn).await?;
    Ok(res.rows_affected() > 0)
}

pub async fn delete_for_user(conn: &mut SqliteConnection, user_id: i64) -> AppResult<u64> {
    let res = sqlx::query("DELETE FROM sessions WHERE user_id = ?1").bind(user_id).execute(&mut *conn).await?;
    Ok(res.rows_affected())
}

pub async fn purge_expired(conn: &mut SqliteConnection, now: DateTime<Utc>) -> AppResult<u64> {
    let res = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1")
        .bind(ts_to_db(now))
        .execute(&mut *conn)
        .await?;
    Ok(res.rows_affected())
}
