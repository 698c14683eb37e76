//! Render-and-store loop shared by every ingestion command

use std::fmt;

use qc_common::db::images::{find_image_id, upsert_image, UpsertOutcome};
use qc_common::db::NewImage;
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::plan::{Plan, RenderJob};
use crate::renderer::Renderer;

/// Per-run counts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub inserted: usize,
    pub updated: usize,
    /// Key already stored and `update` not requested
    pub skipped: usize,
    /// Upstream inputs missing (including unresolved sources)
    pub missing: usize,
    /// Renderer failed for the key
    pub failed: usize,
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserted, {} updated, {} skipped, {} missing, {} failed",
            self.inserted, self.updated, self.skipped, self.missing, self.failed
        )
    }
}

pub struct Ingestor<R> {
    db: SqlitePool,
    renderer: R,
    update: bool,
}

impl<R: Renderer> Ingestor<R> {
    /// With `update == false`, existing images are never re-rendered or touched.
    pub fn new(db: SqlitePool, renderer: R, update: bool) -> Self {
        Self { db, renderer, update }
    }

    /// Render and store every job of `plan`
    ///
    /// Missing inputs and renderer failures skip the key; database errors abort.
    pub async fn run(&self, plan: Plan) -> Result<IngestSummary> {
        let mut summary = IngestSummary {
            missing: plan.unresolved,
            ..Default::default()
        };
        let total = plan.jobs.len();

        for (n, job) in plan.jobs.into_iter().enumerate() {
            debug!(
                job = n + 1,
                total,
                file1 = %job.key.file1,
                display = job.key.display.as_str(),
                slice = ?job.key.slice,
                "Processing"
            );
            self.process(job, &mut summary).await?;
        }

        info!("Ingestion finished: {}", summary);
        Ok(summary)
    }

    async fn process(&self, job: RenderJob, summary: &mut IngestSummary) -> Result<()> {
        let missing = job.missing_inputs();
        if !missing.is_empty() {
            warn!(file1 = %job.key.file1, "Missing input {}, skipping", missing[0].display());
            summary.missing += 1;
            return Ok(());
        }

        // Avoid rendering keys that would be left untouched anyway
        if !self.update && find_image_id(&self.db, &job.key).await?.is_some() {
            debug!(file1 = %job.key.file1, "Found image, skipping");
            summary.skipped += 1;
            return Ok(());
        }

        let img = match self.renderer.render(&job.request()).await {
            Ok(img) => img,
            Err(e) => {
                error!(file1 = %job.key.file1, "Render failed: {}", e);
                summary.failed += 1;
                return Ok(());
            }
        };

        let image = NewImage {
            key: job.key,
            file2: job.file2,
            img,
        };
        match upsert_image(&self.db, &image, self.update).await? {
            UpsertOutcome::Inserted(_) => summary.inserted += 1,
            UpsertOutcome::Updated(_) => summary.updated += 1,
            UpsertOutcome::Skipped(_) => summary.skipped += 1,
        }

        Ok(())
    }
}
