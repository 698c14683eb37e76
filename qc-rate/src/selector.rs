//! Least-rated image selection
//!
//! Picks the next image to show a rater for a pipeline step. Judgment counts
//! come from `ratings` or `clicked_coordinates` depending on the step (see
//! [`qc_common::StepProfile`]). Ties go to the lowest image id.
//!
//! Two policies are available:
//! - [`SelectionPolicy::PerFile`]: aggregate counts per source file, take the
//!   least-rated file other than the one just rated, then the least-rated
//!   image inside it. Keeps raters off different crops of the same scan.
//! - [`SelectionPolicy::PerImage`]: take the least-rated image overall,
//!   excluding only the image just rated.

use qc_common::db::{images, Image};
use qc_common::Step;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Selection errors
#[derive(Debug, Error)]
pub enum SelectError {
    /// No image matches the query
    #[error("No image found for step {0}")]
    NotFound(Step),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Common(#[from] qc_common::Error),
}

/// Granularity of exclusion and aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    #[default]
    PerFile,
    PerImage,
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "per-file" | "file" => Ok(SelectionPolicy::PerFile),
            "per-image" | "image" => Ok(SelectionPolicy::PerImage),
            other => Err(format!(
                "Unknown selection policy '{}': expected per-file or per-image",
                other
            )),
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionPolicy::PerFile => f.write_str("per-file"),
            SelectionPolicy::PerImage => f.write_str("per-image"),
        }
    }
}

/// Least-rated-first image picker
#[derive(Debug, Clone)]
pub struct Selector {
    db: SqlitePool,
    policy: SelectionPolicy,
}

impl Selector {
    pub fn new(db: SqlitePool, policy: SelectionPolicy) -> Self {
        Self { db, policy }
    }

    /// Pick the id of the next image to show for `step`
    ///
    /// Never returns `exclude`. Fails with [`SelectError::NotFound`] when no
    /// other image of the step exists.
    pub async fn pick_next(&self, step: Step, exclude: Option<i64>) -> Result<i64, SelectError> {
        let picked = match self.policy {
            SelectionPolicy::PerImage => self.least_rated_image(step, None, exclude).await?,
            SelectionPolicy::PerFile => self.pick_per_file(step, exclude).await?,
        };

        debug!(step = %step, exclude = ?exclude, picked = ?picked, policy = %self.policy, "Selection finished");
        picked.ok_or(SelectError::NotFound(step))
    }

    /// Pick and load the next image
    pub async fn next_image(&self, step: Step, exclude: Option<i64>) -> Result<Image, SelectError> {
        let id = self.pick_next(step, exclude).await?;
        // The image may have been deleted between the two queries
        images::get_image(&self.db, id)
            .await?
            .ok_or(SelectError::NotFound(step))
    }

    async fn pick_per_file(&self, step: Step, exclude: Option<i64>) -> Result<Option<i64>, SelectError> {
        let excluded_file = match exclude {
            Some(id) => self.source_file_of(id).await?,
            None => None,
        };

        if let Some(file) = self.least_rated_file(step, excluded_file.as_deref()).await? {
            return self.least_rated_image(step, Some(&file), exclude).await;
        }

        // Every image of the step shares the excluded file
        match excluded_file {
            Some(file) => self.least_rated_image(step, Some(&file), exclude).await,
            None => Ok(None),
        }
    }

    async fn source_file_of(&self, image_id: i64) -> Result<Option<String>, SelectError> {
        let file = sqlx::query_scalar::<_, String>("SELECT file1 FROM images WHERE id = ?")
            .bind(image_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(file)
    }

    /// Source file with the fewest judgments summed over its images
    async fn least_rated_file(&self, step: Step, excluded_file: Option<&str>) -> Result<Option<String>, SelectError> {
        let sql = format!(
            r#"
            SELECT i.file1
            FROM images i
            LEFT JOIN {table} j ON j.image_id = i.id
            WHERE i.step = ?1 AND (?2 IS NULL OR i.file1 <> ?2)
            GROUP BY i.file1
            ORDER BY COUNT(j.id) ASC, MIN(i.id) ASC
            LIMIT 1
            "#,
            table = step.judgment_kind().table()
        );

        let file = sqlx::query_scalar::<_, String>(&sql)
            .bind(step)
            .bind(excluded_file)
            .fetch_optional(&self.db)
            .await?;
        Ok(file)
    }

    /// Image with the fewest judgments, optionally restricted to one file
    async fn least_rated_image(
        &self,
        step: Step,
        file: Option<&str>,
        exclude: Option<i64>,
    ) -> Result<Option<i64>, SelectError> {
        let sql = format!(
            r#"
            SELECT i.id
            FROM images i
            LEFT JOIN {table} j ON j.image_id = i.id
            WHERE i.step = ?1
              AND (?2 IS NULL OR i.file1 = ?2)
              AND (?3 IS NULL OR i.id <> ?3)
            GROUP BY i.id
            ORDER BY COUNT(j.id) ASC, i.id ASC
            LIMIT 1
            "#,
            table = step.judgment_kind().table()
        );

        let id = sqlx::query_scalar::<_, i64>(&sql)
            .bind(step)
            .bind(file)
            .bind(exclude)
            .fetch_optional(&self.db)
            .await?;
        Ok(id)
    }
}
