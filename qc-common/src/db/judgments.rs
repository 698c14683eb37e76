//! Rating and click persistence

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::{ClickExport, ClickRecord, JudgmentMeta, Point, Rating, RatingExport};
use crate::{JudgmentKind, RatingValue, Result};

/// Store one PASS/UNSURE/FAIL verdict
pub async fn insert_rating(pool: &SqlitePool, meta: &JudgmentMeta, rating: RatingValue) -> Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO ratings (image_id, session_id, rating, source_data_issue, comments, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(meta.image_id)
    .bind(meta.session_id)
    .bind(rating)
    .bind(meta.source_data_issue)
    .bind(&meta.comments)
    .bind(Utc::now())
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(id)
}

/// Store the clicked points of one submission
///
/// No points yields exactly one row with null coordinates; N points yield N
/// rows. All rows are written in one transaction and share the metadata.
pub async fn insert_clicks(pool: &SqlitePool, meta: &JudgmentMeta, points: &[Point]) -> Result<Vec<i64>> {
    let created_at = Utc::now();
    let coordinates: Vec<(Option<f64>, Option<f64>)> = if points.is_empty() {
        vec![(None, None)]
    } else {
        points.iter().map(|p| (Some(p.x), Some(p.y))).collect()
    };

    let mut tx = pool.begin().await?;
    let mut ids = Vec::with_capacity(coordinates.len());

    for (x, y) in coordinates {
        let id = sqlx::query(
            r#"
            INSERT INTO clicked_coordinates
                (image_id, session_id, x, y, source_data_issue, comments, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(meta.image_id)
        .bind(meta.session_id)
        .bind(x)
        .bind(y)
        .bind(meta.source_data_issue)
        .bind(&meta.comments)
        .bind(created_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        ids.push(id);
    }

    tx.commit().await?;

    Ok(ids)
}

/// Number of judgment rows of `kind` attached to an image
pub async fn count_judgments(pool: &SqlitePool, kind: JudgmentKind, image_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM {} WHERE image_id = ?",
        kind.table()
    ))
    .bind(image_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

pub async fn ratings_for_session(pool: &SqlitePool, session_id: i64) -> Result<Vec<Rating>> {
    let rows = sqlx::query_as::<_, Rating>(
        r#"
        SELECT id, image_id, session_id, rating, source_data_issue, comments, created_at
        FROM ratings WHERE session_id = ? ORDER BY id
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn clicks_for_session(pool: &SqlitePool, session_id: i64) -> Result<Vec<ClickRecord>> {
    let rows = sqlx::query_as::<_, ClickRecord>(
        r#"
        SELECT id, image_id, session_id, x, y, source_data_issue, comments, created_at
        FROM clicked_coordinates WHERE session_id = ? ORDER BY id
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// All ratings with the rater's user name, for bulk retrieval
pub async fn list_ratings(pool: &SqlitePool) -> Result<Vec<RatingExport>> {
    let rows = sqlx::query_as::<_, RatingExport>(
        r#"
        SELECT r.id, r.session_id, s.user AS session_user, r.image_id, r.rating,
               r.source_data_issue, r.comments, r.created_at
        FROM ratings r
        JOIN sessions s ON s.id = r.session_id
        ORDER BY r.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// All clicked coordinates with the rater's user name, for bulk retrieval
pub async fn list_clicks(pool: &SqlitePool) -> Result<Vec<ClickExport>> {
    let rows = sqlx::query_as::<_, ClickExport>(
        r#"
        SELECT c.id, c.session_id, s.user AS session_user, c.image_id, c.x, c.y,
               c.source_data_issue, c.comments, c.created_at
        FROM clicked_coordinates c
        JOIN sessions s ON s.id = c.session_id
        ORDER BY c.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
