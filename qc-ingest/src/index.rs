//! BIDS index table
//!
//! A CSV file listing derivative files, one per row, with header
//! `root,path,datatype,desc,res,space,sub`. Empty cells read as missing.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{IngestError, Result};

/// Template space of spatially normalized anatomicals
pub const MNI_SPACE: &str = "MNI152NLin2009cAsym";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IndexRow {
    pub root: String,
    pub path: String,
    pub datatype: Option<String>,
    pub desc: Option<String>,
    pub res: Option<String>,
    pub space: Option<String>,
    pub sub: Option<String>,
}

impl IndexRow {
    /// `root/path`
    pub fn full_path(&self) -> PathBuf {
        Path::new(&self.root).join(&self.path)
    }

    fn is(&self, datatype: &str, desc: &str) -> bool {
        self.datatype.as_deref() == Some(datatype) && self.desc.as_deref() == Some(desc)
    }

    /// Brain masks at native resolution
    pub fn is_brain_mask(&self) -> bool {
        self.is("anat", "brain") && self.res.is_none()
    }

    /// Preprocessed anatomicals in the MNI template at native resolution
    pub fn is_normalized_anat(&self) -> bool {
        self.is("anat", "preproc") && self.res.is_none() && self.space.as_deref() == Some(MNI_SPACE)
    }

    /// Preprocessed field maps
    pub fn is_preproc_fieldmap(&self) -> bool {
        self.is("fmap", "preproc")
    }
}

pub fn read_index(path: &Path) -> Result<Vec<IndexRow>> {
    let index_error = |source| IngestError::Index {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(index_error)?;
    let rows = reader
        .deserialize()
        .collect::<std::result::Result<Vec<IndexRow>, _>>()
        .map_err(index_error)?;

    debug!(rows = rows.len(), "Read index {}", path.display());
    Ok(rows)
}
