//! qc-ingest library - batch loading of QC images
//!
//! One command per pipeline step discovers source files, renders each
//! (file, axis, cut) through a [`renderer::Renderer`] and stores the result
//! in the image table. Re-running a command is a no-op unless `update` is
//! requested, in which case only payloads are replaced.

pub mod error;
pub mod index;
pub mod ingest;
pub mod plan;
pub mod renderer;

pub use error::{IngestError, Result};
pub use ingest::{IngestSummary, Ingestor};
pub use renderer::{CommandRenderer, RenderRequest, Renderer};
