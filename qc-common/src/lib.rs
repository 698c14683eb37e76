//! # QC App Common Library
//!
//! Shared code for the rating service and the ingestion CLI including:
//! - Database schema and queries (images, sessions, ratings, clicks)
//! - Pipeline step enums and the step lookup table
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod db;
pub mod error;
pub mod steps;

pub use error::{Error, Result};
pub use steps::{ContentType, DisplayAxis, JudgmentKind, RatingValue, Step, StepProfile};
