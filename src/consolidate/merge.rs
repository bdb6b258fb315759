//! Joining a specimen's coordinate records with its shape descriptors.

use crate::consolidate::{cohort_name, list_specimen_dirs, FileLayout, SpecimenFailure};
use crate::data::schema::{self, DESCRIPTORS, LABEL_OFFSET, SOURCE_LABEL, X, Y};
use crate::data::{ensure_dir, DropletRecord, ShapeDescriptors, SpecimenTable, Table, Value};
use crate::error::{MorphError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// A source table together with the file it was read from.
#[derive(Debug, Clone)]
pub struct SourceTable {
    pub path: PathBuf,
    pub table: Table,
}

impl SourceTable {
    /// Load a source file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let table = Table::from_csv(&path)?;
        Ok(Self { path, table })
    }
}

/// Outcome of merging one specimen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    pub specimen: String,
    /// Rows in the coordinate source.
    pub n_coordinates: usize,
    /// Rows in the descriptor source.
    pub n_descriptors: usize,
    /// Rows in the merged table.
    pub n_merged: usize,
    /// Aligned labels present only in the coordinate source.
    pub unmatched_coordinates: Vec<i64>,
    /// Droplet indices present only in the descriptor source.
    pub unmatched_descriptors: Vec<i64>,
}

impl MergeReport {
    /// Total droplets dropped by the inner join.
    pub fn n_unmatched(&self) -> usize {
        self.unmatched_coordinates.len() + self.unmatched_descriptors.len()
    }
}

/// Outcome of merging every specimen of a cohort.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CohortMergeReport {
    pub cohort: String,
    pub merged: Vec<MergeReport>,
    pub failed: Vec<SpecimenFailure>,
}

fn parse_label(value: &Value, source: &SourceTable, row: usize, column: &str) -> Result<i64> {
    match value {
        Value::Number(v) if v.fract() == 0.0 => Ok(*v as i64),
        other => Err(MorphError::InvalidValue {
            path: source.path.clone(),
            row,
            column: column.to_string(),
            value: other.render(),
        }),
    }
}

/// Coordinates keyed by one-based label, in source order.
fn index_coordinates(source: &SourceTable) -> Result<(Vec<i64>, HashMap<i64, (Value, Value)>)> {
    let headers = source.table.columns();
    let find = |name: &str| {
        schema::find_source_column(headers, name, true)
            .ok_or_else(|| MorphError::schema(&source.path, format!("missing required column '{}'", name)))
    };
    let label_idx = find(SOURCE_LABEL)?;
    let x_idx = find(X)?;
    let y_idx = find(Y)?;

    let mut order = Vec::with_capacity(source.table.n_rows());
    let mut coords = HashMap::with_capacity(source.table.n_rows());
    for (i, row) in source.table.rows().iter().enumerate() {
        let label = parse_label(&row[label_idx], source, i + 1, SOURCE_LABEL)? + LABEL_OFFSET;
        if coords
            .insert(label, (row[x_idx].clone(), row[y_idx].clone()))
            .is_some()
        {
            return Err(MorphError::schema(
                &source.path,
                format!("duplicate label {} at row {}", label - LABEL_OFFSET, i + 1),
            ));
        }
        order.push(label);
    }
    Ok((order, coords))
}

/// Resolve the descriptor columns, reporting every missing one at once.
fn descriptor_indices(source: &SourceTable) -> Result<Vec<usize>> {
    let headers = source.table.columns();
    let mut indices = Vec::with_capacity(DESCRIPTORS.len());
    let mut missing = Vec::new();
    for d in DESCRIPTORS.iter() {
        match schema::find_source_column(headers, d.source, false) {
            Some(idx) => indices.push(idx),
            None => missing.push(d.source),
        }
    }
    if !missing.is_empty() {
        return Err(MorphError::schema(
            &source.path,
            format!("missing required columns {:?}", missing),
        ));
    }
    Ok(indices)
}

fn descriptor_value(value: &Value, source: &SourceTable, row: usize, column: &str) -> Result<Option<f64>> {
    match value {
        Value::Number(v) => Ok(Some(*v)),
        Value::Missing => Ok(None),
        Value::Text(raw) => Err(MorphError::InvalidValue {
            path: source.path.clone(),
            row,
            column: column.to_string(),
            value: raw.clone(),
        }),
    }
}

/// Join a specimen's coordinate source with its descriptor source.
///
/// Coordinate labels are zero-based and shifted by [`LABEL_OFFSET`]; the
/// descriptor source's first column carries the one-based droplet index as
/// its only digits. Droplets present in one source only are dropped and
/// listed in the report. Output rows follow descriptor-source order.
///
/// # Errors
/// `Schema` when a required column is missing, a key is duplicated or an
/// identifier has no digits; `EmptyJoin` when no droplet is in both sources.
pub fn merge_records(
    specimen: &str,
    coordinates: &SourceTable,
    descriptors: &SourceTable,
) -> Result<(SpecimenTable, MergeReport)> {
    let (coord_order, coords) = index_coordinates(coordinates)?;
    let desc_idx = descriptor_indices(descriptors)?;

    let mut records = Vec::new();
    let mut seen: HashSet<i64> = HashSet::new();
    let mut unmatched_descriptors = Vec::new();

    for (i, row) in descriptors.table.rows().iter().enumerate() {
        let identifier = row[0].render();
        let index = schema::extract_droplet_index(&identifier).ok_or_else(|| {
            MorphError::schema(
                &descriptors.path,
                format!("identifier '{}' at row {} has no droplet index", identifier, i + 1),
            )
        })?;
        if !seen.insert(index) {
            return Err(MorphError::schema(
                &descriptors.path,
                format!("duplicate droplet index {} at row {}", index, i + 1),
            ));
        }

        let Some((x, y)) = coords.get(&index) else {
            unmatched_descriptors.push(index);
            continue;
        };

        let mut values = [None; DESCRIPTORS.len()];
        for (slot, (d, &col)) in values.iter_mut().zip(DESCRIPTORS.iter().zip(&desc_idx)) {
            *slot = descriptor_value(&row[col], descriptors, i + 1, d.source)?;
        }

        records.push(DropletRecord {
            label: index,
            x: x.clone(),
            y: y.clone(),
            descriptors: ShapeDescriptors::from_values(values),
        });
    }

    let unmatched_coordinates: Vec<i64> = coord_order
        .into_iter()
        .filter(|label| !seen.contains(label))
        .collect();

    if records.is_empty() {
        return Err(MorphError::EmptyJoin(specimen.to_string()));
    }

    let report = MergeReport {
        specimen: specimen.to_string(),
        n_coordinates: coordinates.table.n_rows(),
        n_descriptors: descriptors.table.n_rows(),
        n_merged: records.len(),
        unmatched_coordinates,
        unmatched_descriptors,
    };
    if report.n_unmatched() > 0 {
        tracing::warn!(
            "Specimen '{}': dropped {} coordinate-only and {} descriptor-only droplets",
            specimen,
            report.unmatched_coordinates.len(),
            report.unmatched_descriptors.len()
        );
    }

    Ok((
        SpecimenTable {
            specimen: specimen.to_string(),
            records,
        },
        report,
    ))
}

/// Merge one specimen's source files and write the merged table.
pub fn merge_specimen_files(
    specimen: &str,
    coordinates_path: &Path,
    descriptors_path: &Path,
    output_path: &Path,
) -> Result<MergeReport> {
    let coordinates = SourceTable::load(coordinates_path)?;
    let descriptors = SourceTable::load(descriptors_path)?;
    let (table, report) = merge_records(specimen, &coordinates, &descriptors)?;
    table.to_csv(output_path)?;
    tracing::debug!(
        "Merged {} droplets for '{}' into {}",
        report.n_merged,
        specimen,
        output_path.display()
    );
    Ok(report)
}

/// Path of a specimen's merged table inside a shared output directory.
pub fn merged_path(output_dir: &Path, specimen: &str) -> PathBuf {
    output_dir.join(format!("{}.csv", specimen))
}

/// Merge every specimen folder under `root`, writing each folder's merged
/// table next to its sources.
///
/// Specimens are processed in parallel. A specimen whose sources are
/// unreadable or malformed is logged and recorded in the report; the run
/// fails when no specimen merges or when an error outside a single
/// specimen occurs, such as a failed write.
pub fn merge_cohort<P: AsRef<Path>>(root: P, layout: &FileLayout) -> Result<CohortMergeReport> {
    let root = root.as_ref();
    merge_specimens(root, layout, |_, dir| dir.join(&layout.merged_file))
}

/// Merge every specimen folder under `root` into `output_dir`, one
/// `<specimen>.csv` per merged specimen (see [`merged_path`]).
///
/// The specimen folders are only read.
pub fn merge_cohort_into<P: AsRef<Path>, Q: AsRef<Path>>(
    root: P,
    layout: &FileLayout,
    output_dir: Q,
) -> Result<CohortMergeReport> {
    let output_dir = output_dir.as_ref();
    ensure_dir(output_dir)?;
    merge_specimens(root.as_ref(), layout, |name, _| merged_path(output_dir, name))
}

fn merge_specimens<F>(root: &Path, layout: &FileLayout, output_for: F) -> Result<CohortMergeReport>
where
    F: Fn(&str, &Path) -> PathBuf + Sync,
{
    let cohort = cohort_name(root);
    let specimens = list_specimen_dirs(root)?;

    let outcomes: Vec<(String, Result<MergeReport>)> = specimens
        .par_iter()
        .map(|(name, dir)| {
            let result = merge_specimen_files(
                name,
                &dir.join(&layout.coordinates_file),
                &dir.join(&layout.descriptors_file),
                &output_for(name, dir),
            );
            (name.clone(), result)
        })
        .collect();

    let mut report = CohortMergeReport {
        cohort: cohort.clone(),
        ..Default::default()
    };
    for (specimen, outcome) in outcomes {
        match outcome {
            Ok(r) => report.merged.push(r),
            Err(e) if e.is_specimen_local() => {
                tracing::warn!("Skipping specimen '{}' in cohort '{}': {}", specimen, cohort, e);
                report.failed.push(SpecimenFailure {
                    specimen,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    if report.merged.is_empty() {
        return Err(MorphError::NoDataFound(cohort));
    }
    tracing::info!(
        "Merged {} specimens in cohort '{}' ({} skipped)",
        report.merged.len(),
        cohort,
        report.failed.len()
    );
    Ok(report)
}
