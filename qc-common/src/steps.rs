//! Pipeline steps and the per-step lookup table
//!
//! Every branch that depends on the pipeline step (which judgment table to
//! count, which content type to serve, which URL to route to) goes through
//! [`StepProfile`] instead of matching on the step at the call site.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Stage of the neuroimaging pipeline being quality-checked
///
/// Stored as INTEGER in `sessions.step` and `images.step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(into = "i64", try_from = "i64")]
#[repr(i64)]
pub enum Step {
    Mask = 0,
    SpatialNormalization = 1,
    SurfaceLocalization = 2,
    FmapCoregistration = 3,
    Dtifit = 4,
}

impl Step {
    /// All steps in display order
    pub const ALL: [Step; 5] = [
        Step::Mask,
        Step::SpatialNormalization,
        Step::SurfaceLocalization,
        Step::FmapCoregistration,
        Step::Dtifit,
    ];

    pub fn code(self) -> i64 {
        self as i64
    }

    /// Lookup table entry for this step
    pub fn profile(self) -> &'static StepProfile {
        &STEP_PROFILES[self as usize]
    }

    pub fn slug(self) -> &'static str {
        self.profile().slug
    }

    pub fn judgment_kind(self) -> JudgmentKind {
        self.profile().judgment
    }

    pub fn content_type(self) -> ContentType {
        self.profile().content_type
    }

    /// Resolve a step from its URL slug
    pub fn from_slug(slug: &str) -> Option<Step> {
        STEP_PROFILES
            .iter()
            .find(|p| p.slug == slug)
            .map(|p| p.step)
    }
}

impl From<Step> for i64 {
    fn from(step: Step) -> i64 {
        step as i64
    }
}

impl TryFrom<i64> for Step {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Step::Mask),
            1 => Ok(Step::SpatialNormalization),
            2 => Ok(Step::SurfaceLocalization),
            3 => Ok(Step::FmapCoregistration),
            4 => Ok(Step::Dtifit),
            other => Err(Error::InvalidInput(format!("Unknown step: {}", other))),
        }
    }
}

impl FromStr for Step {
    type Err = Error;

    /// Accepts the integer code, the slug, or the upper-case name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<i64>() {
            return Step::try_from(code);
        }
        let lowered = s.to_ascii_lowercase();
        Step::from_slug(&lowered)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown step: {}", s)))
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.profile().label)
    }
}

/// Which judgment table an image's rating count is taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgmentKind {
    /// PASS/UNSURE/FAIL verdicts in `ratings`
    Rating,
    /// Clicked points in `clicked_coordinates`
    Click,
}

impl JudgmentKind {
    /// Table holding judgments of this kind
    pub fn table(self) -> &'static str {
        match self {
            JudgmentKind::Rating => "ratings",
            JudgmentKind::Click => "clicked_coordinates",
        }
    }
}

/// Encoding of the stored image payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Png,
    Gif,
}

impl ContentType {
    pub fn mime(self) -> &'static str {
        match self {
            ContentType::Png => "image/png",
            ContentType::Gif => "image/gif",
        }
    }
}

/// Static per-step configuration
#[derive(Debug)]
pub struct StepProfile {
    pub step: Step,
    pub judgment: JudgmentKind,
    pub content_type: ContentType,
    pub slug: &'static str,
    pub label: &'static str,
}

/// Indexed by `Step as usize`
static STEP_PROFILES: [StepProfile; 5] = [
    StepProfile {
        step: Step::Mask,
        judgment: JudgmentKind::Click,
        content_type: ContentType::Png,
        slug: "mask",
        label: "MASK",
    },
    StepProfile {
        step: Step::SpatialNormalization,
        judgment: JudgmentKind::Click,
        content_type: ContentType::Png,
        slug: "spatial_normalization",
        label: "SPATIAL_NORMALIZATION",
    },
    StepProfile {
        step: Step::SurfaceLocalization,
        judgment: JudgmentKind::Click,
        content_type: ContentType::Png,
        slug: "surface_localization",
        label: "SURFACE_LOCALIZATION",
    },
    StepProfile {
        step: Step::FmapCoregistration,
        judgment: JudgmentKind::Rating,
        content_type: ContentType::Gif,
        slug: "fmap_coregistration",
        label: "FMAP_COREGISTRATION",
    },
    StepProfile {
        step: Step::Dtifit,
        judgment: JudgmentKind::Rating,
        content_type: ContentType::Gif,
        slug: "dtifit",
        label: "DTIFIT",
    },
];

/// Axis along which a slice is displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(into = "i64", try_from = "i64")]
#[repr(i64)]
pub enum DisplayAxis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl DisplayAxis {
    pub const ALL: [DisplayAxis; 3] = [DisplayAxis::X, DisplayAxis::Y, DisplayAxis::Z];

    /// Lower-case name passed to the renderer
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayAxis::X => "x",
            DisplayAxis::Y => "y",
            DisplayAxis::Z => "z",
        }
    }
}

impl From<DisplayAxis> for i64 {
    fn from(axis: DisplayAxis) -> i64 {
        axis as i64
    }
}

impl TryFrom<i64> for DisplayAxis {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DisplayAxis::X),
            1 => Ok(DisplayAxis::Y),
            2 => Ok(DisplayAxis::Z),
            other => Err(Error::InvalidInput(format!("Unknown display axis: {}", other))),
        }
    }
}

/// Verdict recorded in `ratings.rating`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(into = "i64", try_from = "i64")]
#[repr(i64)]
pub enum RatingValue {
    Pass = 0,
    Unsure = 1,
    Fail = 2,
}

impl RatingValue {
    pub const ALL: [RatingValue; 3] = [RatingValue::Pass, RatingValue::Unsure, RatingValue::Fail];

    pub fn label(self) -> &'static str {
        match self {
            RatingValue::Pass => "Pass",
            RatingValue::Unsure => "Unsure",
            RatingValue::Fail => "Fail",
        }
    }
}

impl From<RatingValue> for i64 {
    fn from(value: RatingValue) -> i64 {
        value as i64
    }
}

impl TryFrom<i64> for RatingValue {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RatingValue::Pass),
            1 => Ok(RatingValue::Unsure),
            2 => Ok(RatingValue::Fail),
            other => Err(Error::InvalidInput(format!("Rating must be 0, 1 or 2, got {}", other))),
        }
    }
}
