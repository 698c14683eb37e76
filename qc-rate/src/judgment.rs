//! Validated judgment submissions
//!
//! Both kinds of judgment share the "persist against (image, session)"
//! contract expressed by [`Judgment`]; the workflow does not care which one
//! it holds.

use std::future::Future;

use qc_common::db::judgments::{insert_clicks, insert_rating};
use qc_common::db::{JudgmentMeta, Point};
use qc_common::{JudgmentKind, RatingValue};
use sqlx::SqlitePool;

/// Where a judgment is attributed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribution {
    pub image_id: i64,
    pub session_id: i64,
}

/// A submission that can be stored against an image
pub trait Judgment {
    fn kind(&self) -> JudgmentKind;

    /// Write the judgment rows; returns how many rows were written
    fn persist(
        &self,
        pool: &SqlitePool,
        attribution: Attribution,
    ) -> impl Future<Output = qc_common::Result<usize>> + Send;
}

/// PASS/UNSURE/FAIL verdict
#[derive(Debug, Clone, PartialEq)]
pub struct RatingSubmission {
    pub rating: RatingValue,
    pub source_data_issue: bool,
    pub comments: String,
}

/// Clicked points marking problem regions; may be empty
#[derive(Debug, Clone, PartialEq)]
pub struct ClickSubmission {
    pub points: Vec<Point>,
    pub source_data_issue: bool,
    pub comments: String,
}

fn meta(attribution: Attribution, source_data_issue: bool, comments: &str) -> JudgmentMeta {
    JudgmentMeta {
        image_id: attribution.image_id,
        session_id: attribution.session_id,
        source_data_issue,
        comments: comments.to_string(),
    }
}

impl Judgment for RatingSubmission {
    fn kind(&self) -> JudgmentKind {
        JudgmentKind::Rating
    }

    async fn persist(&self, pool: &SqlitePool, attribution: Attribution) -> qc_common::Result<usize> {
        let meta = meta(attribution, self.source_data_issue, &self.comments);
        insert_rating(pool, &meta, self.rating).await?;
        Ok(1)
    }
}

impl Judgment for ClickSubmission {
    fn kind(&self) -> JudgmentKind {
        JudgmentKind::Click
    }

    async fn persist(&self, pool: &SqlitePool, attribution: Attribution) -> qc_common::Result<usize> {
        let meta = meta(attribution, self.source_data_issue, &self.comments);
        let ids = insert_clicks(pool, &meta, &self.points).await?;
        Ok(ids.len())
    }
}

/// Either kind of validated submission
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Rating(RatingSubmission),
    Click(ClickSubmission),
}

impl Judgment for Submission {
    fn kind(&self) -> JudgmentKind {
        match self {
            Submission::Rating(r) => r.kind(),
            Submission::Click(c) => c.kind(),
        }
    }

    async fn persist(&self, pool: &SqlitePool, attribution: Attribution) -> qc_common::Result<usize> {
        match self {
            Submission::Rating(r) => r.persist(pool, attribution).await,
            Submission::Click(c) => c.persist(pool, attribution).await,
        }
    }
}
