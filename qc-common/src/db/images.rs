//! Image Store queries
//!
//! Images are keyed by (slice, file1, display, step). The `image_meta` index
//! coalesces NULL slices so storage rejects duplicate slice-less keys; lookups
//! match it with the null-safe `IS` comparison.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::db::models::{Image, ImageKey, NewImage};
use crate::{Error, Result, Step};

const IMAGE_COLUMNS: &str = "id, img, slice, file1, file2, display, step, created_at";

/// What [`upsert_image`] did with a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Updated(i64),
    Skipped(i64),
}

pub async fn get_image(pool: &SqlitePool, id: i64) -> Result<Option<Image>> {
    let image = sqlx::query_as::<_, Image>(&format!(
        "SELECT {} FROM images WHERE id = ?",
        IMAGE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(image)
}

/// Find the id of the image stored at `key`
pub async fn find_image_id(pool: &SqlitePool, key: &ImageKey) -> Result<Option<i64>> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT id FROM images
        WHERE slice IS ? AND file1 = ? AND display = ? AND step = ?
        "#,
    )
    .bind(key.slice)
    .bind(&key.file1)
    .bind(key.display)
    .bind(key.step)
    .fetch_optional(pool)
    .await?;

    Ok(id)
}

/// Insert a new image; fails with [`Error::Conflict`] on a key collision
pub async fn insert_image(pool: &SqlitePool, image: &NewImage) -> Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO images (img, slice, file1, file2, display, step, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&image.img)
    .bind(image.key.slice)
    .bind(&image.key.file1)
    .bind(&image.file2)
    .bind(image.key.display)
    .bind(image.key.step)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(|e| Error::from_write(e, "image key"))?
    .last_insert_rowid();

    Ok(id)
}

/// Replace the payload of an existing image, leaving its key untouched
pub async fn update_image_payload(pool: &SqlitePool, id: i64, img: &[u8]) -> Result<()> {
    sqlx::query("UPDATE images SET img = ?, created_at = ? WHERE id = ?")
        .bind(img)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Insert `image`, or handle an existing key according to `update`
///
/// With `update == false` an existing row is left byte-for-byte unchanged.
/// With `update == true` only the payload (and its timestamp) is replaced.
pub async fn upsert_image(pool: &SqlitePool, image: &NewImage, update: bool) -> Result<UpsertOutcome> {
    match find_image_id(pool, &image.key).await? {
        Some(id) if update => {
            update_image_payload(pool, id, &image.img).await?;
            debug!(image_id = id, "Replaced image payload");
            Ok(UpsertOutcome::Updated(id))
        }
        Some(id) => Ok(UpsertOutcome::Skipped(id)),
        None => match insert_image(pool, image).await {
            Ok(id) => {
                debug!(image_id = id, "Inserted image");
                Ok(UpsertOutcome::Inserted(id))
            }
            // Another writer stored the key between lookup and insert
            Err(Error::Conflict(_)) => {
                let id = find_image_id(pool, &image.key)
                    .await?
                    .ok_or_else(|| Error::Internal("conflicting image disappeared".to_string()))?;
                if update {
                    update_image_payload(pool, id, &image.img).await?;
                    Ok(UpsertOutcome::Updated(id))
                } else {
                    Ok(UpsertOutcome::Skipped(id))
                }
            }
            Err(e) => Err(e),
        },
    }
}

/// List images in storage order, optionally restricted to one step
pub async fn list_images(pool: &SqlitePool, step: Option<Step>, limit: i64) -> Result<Vec<Image>> {
    let images = match step {
        Some(step) => {
            sqlx::query_as::<_, Image>(&format!(
                "SELECT {} FROM images WHERE step = ? ORDER BY id LIMIT ?",
                IMAGE_COLUMNS
            ))
            .bind(step)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Image>(&format!(
                "SELECT {} FROM images ORDER BY id LIMIT ?",
                IMAGE_COLUMNS
            ))
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(images)
}

/// Delete an image (judgments cascade). Returns false if it did not exist.
pub async fn delete_image(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM images WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn count_images(pool: &SqlitePool, step: Step) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM images WHERE step = ?")
        .bind(step)
        .fetch_one(pool)
        .await?;

    Ok(count)
}
