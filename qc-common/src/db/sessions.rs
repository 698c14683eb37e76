//! Labeling session persistence

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::Session;
use crate::{Result, Step};

/// Create a new labeling session for `step`
pub async fn create_session(pool: &SqlitePool, step: Step, user: Option<&str>) -> Result<Session> {
    let created_at = Utc::now();
    let id = sqlx::query("INSERT INTO sessions (step, created_at, user) VALUES (?, ?, ?)")
        .bind(step)
        .bind(created_at)
        .bind(user)
        .execute(pool)
        .await?
        .last_insert_rowid();

    Ok(Session {
        id,
        step,
        created_at,
        user: user.map(str::to_string),
    })
}

pub async fn get_session(pool: &SqlitePool, id: i64) -> Result<Option<Session>> {
    let session = sqlx::query_as::<_, Session>(
        "SELECT id, step, created_at, user FROM sessions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(session)
}
