//! Job discovery per pipeline step
//!
//! Each function turns a BIDS index or a subjects directory into the list
//! of images the step needs: one [`RenderJob`] per (file, axis, cut). No
//! files are opened here beyond directory listings and field-map sidecars.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use qc_common::db::ImageKey;
use qc_common::{DisplayAxis, Step};
use serde::Deserialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{IngestError, Result};
use crate::index::IndexRow;
use crate::renderer::RenderRequest;

/// Cuts per axis for mask, surface and field-map images
pub const N_CUTS: i64 = 7;

/// Cuts per axis for spatial normalization (fixed template coordinates)
pub const SPATIAL_NORMALIZATION_CUTS: i64 = 2;

/// One image to render and store
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub key: ImageKey,
    pub file2: Option<String>,
    /// Files the renderer reads; all must exist
    pub inputs: Vec<PathBuf>,
}

impl RenderJob {
    pub fn request(&self) -> RenderRequest {
        RenderRequest {
            step: self.key.step,
            axis: self.key.display,
            slice: self.key.slice,
            inputs: self.inputs.clone(),
        }
    }

    /// Inputs that are not on disk
    pub fn missing_inputs(&self) -> Vec<&Path> {
        self.inputs
            .iter()
            .map(PathBuf::as_path)
            .filter(|p| !p.exists())
            .collect()
    }
}

/// Discovered jobs plus sources that could not be expanded
#[derive(Debug, Default, PartialEq)]
pub struct Plan {
    pub jobs: Vec<RenderJob>,
    pub unresolved: usize,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Every axis × `cuts` cut of one source file
fn sliced_jobs(step: Step, file1: &str, file2: Option<&str>, inputs: &[PathBuf], cuts: i64) -> Vec<RenderJob> {
    DisplayAxis::ALL
        .iter()
        .flat_map(|&display| {
            (0..cuts).map(move |cut| RenderJob {
                key: ImageKey {
                    slice: Some(cut),
                    file1: file1.to_string(),
                    display,
                    step,
                },
                file2: file2.map(str::to_string),
                inputs: inputs.to_vec(),
            })
        })
        .collect()
}

/// Brain masks overlaid on their T1w anatomical
pub fn mask_jobs(rows: &[IndexRow]) -> Plan {
    let jobs = rows
        .iter()
        .filter(|row| row.is_brain_mask())
        .flat_map(|row| {
            let mask = row.full_path();
            let anat = PathBuf::from(mask.to_string_lossy().replace("desc-brain_mask", "T1w"));
            let file1 = file_name(&mask);
            let file2 = file_name(&anat);
            sliced_jobs(Step::Mask, &file1, Some(&file2), &[mask, anat], N_CUTS)
        })
        .collect();

    Plan { jobs, unresolved: 0 }
}

/// MNI-space anatomicals under the template atlas outline
pub fn spatial_normalization_jobs(rows: &[IndexRow]) -> Plan {
    let jobs = rows
        .iter()
        .filter(|row| row.is_normalized_anat())
        .flat_map(|row| {
            let anat = row.full_path();
            let file1 = file_name(&anat);
            sliced_jobs(
                Step::SpatialNormalization,
                &file1,
                None,
                &[anat],
                SPATIAL_NORMALIZATION_CUTS,
            )
        })
        .collect();

    Plan { jobs, unresolved: 0 }
}

/// FreeSurfer white/pial contours for the listed subjects
///
/// File names are stored relative to `subjects_dir`, e.g.
/// `sub-01/mri/ribbon.mgz`.
pub fn surface_localization_jobs(subjects_dir: &Path, include: &[String]) -> Result<Plan> {
    let entries = std::fs::read_dir(subjects_dir).map_err(|source| IngestError::Io {
        path: subjects_dir.to_path_buf(),
        source,
    })?;

    let mut subjects: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| include.contains(name))
        .collect();
    subjects.sort();

    let wanted: BTreeSet<&String> = include.iter().collect();
    let mut unresolved = 0;
    for name in wanted.into_iter().filter(|name| !subjects.contains(name)) {
        warn!("Subject {} not found in {}", name, subjects_dir.display());
        unresolved += 1;
    }

    let jobs = subjects
        .iter()
        .flat_map(|subject| {
            let ribbon = Path::new(subject).join("mri").join("ribbon.mgz");
            let brain = Path::new(subject).join("mri").join("brain.mgz");
            let inputs = [subjects_dir.join(&ribbon), subjects_dir.join(&brain)];
            sliced_jobs(
                Step::SurfaceLocalization,
                &ribbon.to_string_lossy(),
                Some(&brain.to_string_lossy()),
                &inputs,
                N_CUTS,
            )
        })
        .collect();

    Ok(Plan { jobs, unresolved })
}

#[derive(Debug, Deserialize)]
struct FieldmapSidecar {
    #[serde(rename = "IntendedFor", default)]
    intended_for: Vec<String>,
}

fn read_sidecar(path: &Path) -> Result<FieldmapSidecar> {
    let text = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|e| IngestError::Sidecar {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Field-map EPI vs. coregistered BOLD reference, one set per `IntendedFor` target
///
/// Each target needs a brain mask, a coregistered boldref and the
/// boldref→field-map transform next to the boldref. A target missing any
/// of them is skipped.
pub fn fmap_coregistration_jobs(rows: &[IndexRow]) -> Plan {
    let mut plan = Plan::default();

    for row in rows.iter().filter(|row| row.is_preproc_fieldmap()) {
        let root = Path::new(&row.root);
        let sidecar_path = root.join(row.path.replace(".nii.gz", ".json"));
        let sidecar = match read_sidecar(&sidecar_path) {
            Ok(sidecar) => sidecar,
            Err(e) => {
                warn!("Skipping field map {}: {}", row.path, e);
                plan.unresolved += 1;
                continue;
            }
        };

        let epi = root.join(row.path.replace("preproc", "epi"));
        let subject_dir = root.join(format!("sub-{}", row.sub.as_deref().unwrap_or_default()));

        for target in &sidecar.intended_for {
            let mask = subject_dir.join(target.replace("_bold", "_desc-brain_mask"));
            let boldref = subject_dir.join(target.replace("_bold", "_desc-coreg_boldref"));
            let transform = boldref.with_file_name(file_name(&boldref).replace(
                "desc-coreg_boldref.nii.gz",
                "from-boldref_to-auto00001_mode-image_xfm.txt",
            ));

            if !(mask.exists() && boldref.exists() && transform.exists()) {
                warn!(target = %target, "Missing mask, boldref or transform, skipping");
                plan.unresolved += 1;
                continue;
            }

            debug!(target = %target, "Field map target resolved");
            let file1 = file_name(&boldref);
            let file2 = file_name(&epi);
            plan.jobs.extend(sliced_jobs(
                Step::FmapCoregistration,
                &file1,
                Some(&file2),
                &[mask, boldref, transform, epi.clone()],
                N_CUTS,
            ));
        }
    }

    plan
}

/// Color-FA animations, one per `*dwi_FA.nii.gz` found under `subjects_dir`
///
/// The principal eigenvector volumes are the FA file's V1/V2/V3 siblings.
pub fn dtifit_jobs(subjects_dir: &Path) -> Plan {
    let mut fa_files: Vec<PathBuf> = WalkDir::new(subjects_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Error accessing entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with("dwi_FA.nii.gz"))
        .map(|entry| entry.into_path())
        .collect();
    fa_files.sort();

    let jobs = fa_files
        .into_iter()
        .map(|fa| {
            let name = file_name(&fa);
            let mut inputs = vec![fa.clone()];
            inputs.extend(["V1", "V2", "V3"].iter().map(|v| fa.with_file_name(name.replace("FA", v))));
            RenderJob {
                key: ImageKey {
                    slice: None,
                    file1: name,
                    display: DisplayAxis::Z,
                    step: Step::Dtifit,
                },
                file2: None,
                inputs,
            }
        })
        .collect();

    Plan { jobs, unresolved: 0 }
}
