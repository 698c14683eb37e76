//! Image payload rendering
//!
//! Slicing and plotting volumes happens outside this crate. The default
//! [`CommandRenderer`] runs an external program
//!
//! ```text
//! <program> <step> --axis <x|y|z> [--slice N] <input files...>
//! ```
//!
//! and takes the PNG or GIF bytes it writes to stdout.

use std::future::Future;
use std::path::PathBuf;

use qc_common::{DisplayAxis, Step};
use tokio::process::Command;
use tracing::debug;

use crate::error::{IngestError, Result};

/// One image to render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub step: Step,
    pub axis: DisplayAxis,
    /// Cut index along the axis; `None` renders the whole volume (DTIFIT)
    pub slice: Option<i64>,
    pub inputs: Vec<PathBuf>,
}

impl RenderRequest {
    /// Arguments passed to an external renderer
    pub fn command_args(&self) -> Vec<String> {
        let mut args = vec![
            self.step.slug().to_string(),
            "--axis".to_string(),
            self.axis.as_str().to_string(),
        ];
        if let Some(slice) = self.slice {
            args.push("--slice".to_string());
            args.push(slice.to_string());
        }
        args.extend(self.inputs.iter().map(|p| p.to_string_lossy().into_owned()));
        args
    }
}

pub trait Renderer {
    fn render(&self, request: &RenderRequest) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Renders by running an external program
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Renderer for CommandRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>> {
        let args = request.command_args();
        debug!(program = %self.program, ?args, "Running renderer");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| IngestError::Render(format!("Failed to execute {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IngestError::Render(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        if output.stdout.is_empty() {
            return Err(IngestError::Render(format!("{} produced no output", self.program)));
        }

        Ok(output.stdout)
    }
}
