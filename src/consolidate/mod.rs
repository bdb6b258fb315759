//! File consolidation: merging measurement sources per specimen, tagging and
//! concatenating specimens into cohorts, stripping coordinates and reducing
//! each specimen to summary statistics.

pub mod cohort;
pub mod merge;
pub mod strip;
pub mod summarize;

pub use cohort::{consolidate_cohort, consolidate_specimens, ConsolidationReport};
pub use merge::{
    merge_cohort, merge_cohort_into, merge_records, merge_specimen_files, merged_path, CohortMergeReport,
    MergeReport, SourceTable,
};
pub use strip::{strip_coordinates, strip_dir, strip_file, strip_files, StripReport};
pub use summarize::{summarize_dir, summarize_files, summarize_table, summarize_tables};

use crate::data::file_name_sort_key;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File names expected inside every specimen folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLayout {
    /// Segmentation-tool output keyed by zero-based `Label`.
    pub coordinates_file: String,
    /// Measurement-tool output keyed by an identifier embedding a one-based index.
    pub descriptors_file: String,
    /// Merged per-specimen table written next to the sources by `merge_cohort`.
    pub merged_file: String,
}

impl Default for FileLayout {
    fn default() -> Self {
        Self {
            coordinates_file: "coordinates.csv".to_string(),
            descriptors_file: "results.csv".to_string(),
            merged_file: "merged.csv".to_string(),
        }
    }
}

/// A specimen excluded from a cohort-level stage, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecimenFailure {
    pub specimen: String,
    pub reason: String,
}

impl std::fmt::Display for SpecimenFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.specimen, self.reason)
    }
}

/// Specimen folders directly under `root` as `(name, path)`, in
/// case-insensitive lexical order.
pub fn list_specimen_dirs<P: AsRef<Path>>(root: P) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(root.as_ref())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort_by_key(|p| file_name_sort_key(p));
    Ok(dirs
        .into_iter()
        .map(|p| {
            let name = p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            (name, p)
        })
        .collect())
}

/// Display name of a cohort rooted at `root`.
pub fn cohort_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}
