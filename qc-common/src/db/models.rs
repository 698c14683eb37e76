//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DisplayAxis, RatingValue, Step};

/// A rater's labeling session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub step: Step,
    pub created_at: DateTime<Utc>,
    pub user: Option<String>,
}

/// A stored QC image
///
/// `img` is the raw PNG or GIF payload; JSON surfaces base64-encode it.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Image {
    pub id: i64,
    pub img: Vec<u8>,
    pub slice: Option<i64>,
    pub file1: String,
    pub file2: Option<String>,
    pub display: DisplayAxis,
    pub step: Step,
    pub created_at: DateTime<Utc>,
}

impl Image {
    pub fn key(&self) -> ImageKey {
        ImageKey {
            slice: self.slice,
            file1: self.file1.clone(),
            display: self.display,
            step: self.step,
        }
    }
}

/// The uniqueness coordinate of an image
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey {
    pub slice: Option<i64>,
    pub file1: String,
    pub display: DisplayAxis,
    pub step: Step,
}

/// Image to be inserted or upserted
#[derive(Debug, Clone)]
pub struct NewImage {
    pub key: ImageKey,
    pub file2: Option<String>,
    pub img: Vec<u8>,
}

/// PASS/UNSURE/FAIL verdict on one image
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Rating {
    pub id: i64,
    pub image_id: i64,
    pub session_id: i64,
    pub rating: RatingValue,
    pub source_data_issue: bool,
    pub comments: String,
    pub created_at: DateTime<Utc>,
}

/// One clicked point on an image
///
/// A submission without points is stored as a single row with null x/y.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ClickRecord {
    pub id: i64,
    pub image_id: i64,
    pub session_id: i64,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub source_data_issue: bool,
    pub comments: String,
    pub created_at: DateTime<Utc>,
}

/// Fields shared by every judgment row of a submission
#[derive(Debug, Clone, PartialEq)]
pub struct JudgmentMeta {
    pub image_id: i64,
    pub session_id: i64,
    pub source_data_issue: bool,
    pub comments: String,
}

/// A clicked coordinate in image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Rating row joined with the rater's user name for bulk export
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RatingExport {
    pub id: i64,
    pub session_id: i64,
    pub session_user: Option<String>,
    pub image_id: i64,
    pub rating: RatingValue,
    pub source_data_issue: bool,
    pub comments: String,
    pub created_at: DateTime<Utc>,
}

/// Click row joined with the rater's user name for bulk export
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ClickExport {
    pub id: i64,
    pub session_id: i64,
    pub session_user: Option<String>,
    pub image_id: i64,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub source_data_issue: bool,
    pub comments: String,
    pub created_at: DateTime<Utc>,
}
