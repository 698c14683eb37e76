//! Error types for qc-ingest

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Index file {path} unreadable: {source}")]
    Index {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Sidecar {path} invalid: {message}")]
    Sidecar { path: PathBuf, message: String },

    /// Renderer could not produce a payload for one key
    #[error("Render failed: {0}")]
    Render(String),

    #[error(transparent)]
    Common(#[from] qc_common::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;
