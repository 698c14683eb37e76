//! Rating page form input
//!
//! Rating steps post `rating` (or `rating_submit`, which wins when both are
//! present). Click steps post `points` as a JSON list of `{"x", "y"}`
//! objects. Both post `source_data_issue` (checkbox) and `comments`.

use qc_common::db::Point;
use qc_common::{JudgmentKind, RatingValue};
use serde::Deserialize;

use crate::judgment::{ClickSubmission, RatingSubmission, Submission};

/// Longest accepted comment
pub const MAX_COMMENT_LEN: usize = 4000;

/// Raw urlencoded form body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JudgmentForm {
    pub rating: Option<String>,
    pub rating_submit: Option<String>,
    pub source_data_issue: Option<String>,
    pub comments: Option<String>,
    pub points: Option<String>,
}

impl JudgmentForm {
    /// Validate against the judgment kind of the session's step
    ///
    /// The error string is shown to the rater next to the same image.
    pub fn validate(&self, kind: JudgmentKind) -> Result<Submission, String> {
        let source_data_issue = parse_checkbox(self.source_data_issue.as_deref());
        let comments = self.comments.as_deref().unwrap_or("").trim().to_string();
        if comments.chars().count() > MAX_COMMENT_LEN {
            return Err(format!("Comments are limited to {} characters", MAX_COMMENT_LEN));
        }

        match kind {
            JudgmentKind::Rating => {
                let raw = self
                    .rating_submit
                    .as_deref()
                    .or(self.rating.as_deref())
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| "Choose Pass, Unsure or Fail".to_string())?;
                Ok(Submission::Rating(RatingSubmission {
                    rating: parse_rating(raw)?,
                    source_data_issue,
                    comments,
                }))
            }
            JudgmentKind::Click => Ok(Submission::Click(ClickSubmission {
                points: parse_points(self.points.as_deref())?,
                source_data_issue,
                comments,
            })),
        }
    }
}

/// HTML checkboxes post "on"; absent means unchecked
fn parse_checkbox(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("on" | "true" | "1" | "yes")
    )
}

/// Accepts the stored code (0/1/2) or the label
fn parse_rating(raw: &str) -> Result<RatingValue, String> {
    let raw = raw.trim();
    if let Ok(code) = raw.parse::<i64>() {
        return RatingValue::try_from(code).map_err(|e| e.to_string());
    }
    RatingValue::ALL
        .into_iter()
        .find(|value| value.label().eq_ignore_ascii_case(raw))
        .ok_or_else(|| format!("Unknown rating '{}'", raw))
}

fn parse_points(raw: Option<&str>) -> Result<Vec<Point>, String> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(Vec::new()),
        Some(raw) => raw,
    };

    let points: Vec<Point> =
        serde_json::from_str(raw).map_err(|e| format!("Clicked points are malformed: {}", e))?;

    if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err("Clicked points must be finite numbers".to_string());
    }

    Ok(points)
}
