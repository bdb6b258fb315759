//! Collecting specimen tables into a tagged cohort table.

use crate::consolidate::{cohort_name, list_specimen_dirs, SpecimenFailure};
use crate::data::schema::{self, SESSION_ID, SPECIMEN_ID};
use crate::data::{ensure_dir, Table, Value};
use crate::error::{MorphError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the concatenated cohort table inside the output directory.
pub const COHORT_TABLE_FILE: &str = "cohort.csv";

/// Directory holding the tagged per-specimen copies inside the output directory.
pub const SPECIMEN_DIR: &str = "specimens";

/// Outcome of consolidating a cohort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub cohort: String,
    /// Specimens included, in enumeration order.
    pub specimens: Vec<String>,
    /// Tagged table written for each included specimen, parallel to `specimens`.
    pub specimen_files: Vec<PathBuf>,
    /// Specimens left out, with the reason.
    pub skipped: Vec<SpecimenFailure>,
    /// Rows in the cohort table.
    pub n_rows: usize,
    /// Concatenated cohort table.
    pub cohort_table: PathBuf,
    /// Directory of tagged per-specimen tables.
    pub specimen_dir: PathBuf,
}

impl ConsolidationReport {
    /// Number of specimens skipped.
    pub fn n_skipped(&self) -> usize {
        self.skipped.len()
    }
}

/// Project a merged table onto the droplet schema, failing on absent columns.
fn conform_to_droplet_schema(table: &Table, path: &Path) -> Result<Table> {
    let columns = schema::droplet_columns();
    schema::require_columns(table.columns(), &columns, path, "merged table")?;
    let indices: Vec<usize> = columns
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();
    let rows = table
        .rows()
        .iter()
        .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Table::with_rows(columns, rows)
}

/// Read one specimen's merged table and tag every row.
fn tagged_specimen(path: &Path, specimen: &str, session_id: Option<&str>) -> Result<Table> {
    let table = Table::from_csv(path)?;
    let session = session_id.map_or(Value::Missing, |s| Value::Text(s.to_string()));
    Ok(conform_to_droplet_schema(&table, path)?
        .with_constant_column(SPECIMEN_ID, Value::Text(specimen.to_string()))
        .with_constant_column(SESSION_ID, session))
}

/// Consolidate every specimen folder under `root` into `output_dir`.
///
/// Each folder's `merged_file` is tagged with the folder name as
/// `specimen_id` and with `session_id`, copied to
/// `output_dir/specimens/<specimen>.csv`, and appended to
/// `output_dir/cohort.csv`. Source files are never modified. Folders without
/// a usable merged file are skipped and reported.
///
/// # Errors
/// `NoDataFound` when every specimen is skipped; any error that is not
/// local to one specimen, such as a failed write, aborts the stage.
pub fn consolidate_cohort<P: AsRef<Path>, Q: AsRef<Path>>(
    root: P,
    output_dir: Q,
    merged_file: &str,
    session_id: Option<&str>,
) -> Result<ConsolidationReport> {
    let root = root.as_ref();
    let sources: Vec<(String, PathBuf)> = list_specimen_dirs(root)?
        .into_iter()
        .map(|(name, dir)| {
            let source = dir.join(merged_file);
            (name, source)
        })
        .collect();
    consolidate_specimens(&cohort_name(root), &sources, output_dir, session_id)
}

/// Consolidate an explicit list of `(specimen, merged table)` pairs.
///
/// Only the listed tables are read, in the order given; anything else lying
/// in `output_dir` is ignored by the report.
pub fn consolidate_specimens<Q: AsRef<Path>>(
    cohort: &str,
    sources: &[(String, PathBuf)],
    output_dir: Q,
    session_id: Option<&str>,
) -> Result<ConsolidationReport> {
    let output_dir = output_dir.as_ref();
    let specimen_dir = output_dir.join(SPECIMEN_DIR);
    ensure_dir(&specimen_dir)?;

    let mut combined = Table::new(schema::cohort_columns());
    let mut specimens = Vec::new();
    let mut specimen_files = Vec::new();
    let mut skipped = Vec::new();

    for (name, source) in sources {
        if !source.is_file() {
            tracing::warn!("Skipping specimen '{}': {} not found", name, source.display());
            skipped.push(SpecimenFailure {
                specimen: name.clone(),
                reason: format!("{} not found", source.display()),
            });
            continue;
        }

        let tagged = match tagged_specimen(source, name, session_id) {
            Ok(t) => t,
            Err(e) if e.is_specimen_local() => {
                tracing::warn!("Skipping specimen '{}': {}", name, e);
                skipped.push(SpecimenFailure {
                    specimen: name.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
            Err(e) => return Err(e),
        };

        let copy = specimen_dir.join(format!("{}.csv", name));
        tagged.to_csv(&copy)?;
        combined.extend(tagged)?;
        specimens.push(name.clone());
        specimen_files.push(copy);
    }

    if specimens.is_empty() {
        return Err(MorphError::NoDataFound(cohort.to_string()));
    }

    let cohort_table = output_dir.join(COHORT_TABLE_FILE);
    combined.to_csv(&cohort_table)?;
    tracing::info!(
        "Consolidated {} specimens ({} rows) for cohort '{}', {} skipped",
        specimens.len(),
        combined.n_rows(),
        cohort,
        skipped.len()
    );

    Ok(ConsolidationReport {
        cohort: cohort.to_string(),
        specimens,
        specimen_files,
        skipped,
        n_rows: combined.n_rows(),
        cohort_table,
        specimen_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DropletRecord, ShapeDescriptors, SpecimenTable};
    use std::fs;
    use tempfile::tempdir;

    fn write_merged(dir: &Path, specimen: &str, n: i64) {
        let table = SpecimenTable {
            specimen: specimen.to_string(),
            records: (1..=n)
                .map(|label| DropletRecord {
                    label,
                    x: Value::Number(label as f64),
                    y: Value::Number(0.0),
                    descriptors: ShapeDescriptors {
                        area: Some(10.0),
                        feret_diameter: Some(5.0),
                        ..Default::default()
                    },
                })
                .collect(),
        };
        let folder = dir.join(specimen);
        fs::create_dir_all(&folder).unwrap();
        table.to_csv(folder.join("merged.csv")).unwrap();
    }

    #[test]
    fn test_consolidate_tags_and_concatenates() {
        let root = tempdir().unwrap();
        let out = tempdir().unwrap();
        write_merged(root.path(), "fish02", 2);
        write_merged(root.path(), "fish01", 3);
        fs::create_dir(root.path().join("fish03")).unwrap();

        let report = consolidate_cohort(root.path(), out.path(), "merged.csv", Some("s1")).unwrap();

        assert_eq!(report.specimens, vec!["fish01", "fish02"]);
        assert_eq!(report.n_skipped(), 1);
        assert_eq!(report.skipped[0].specimen, "fish03");
        assert_eq!(report.n_rows, 5);

        let cohort = Table::from_csv(&report.cohort_table).unwrap();
        assert_eq!(cohort.columns(), schema::cohort_columns().as_slice());
        let specimen_idx = cohort.column_index(SPECIMEN_ID).unwrap();
        let session_idx = cohort.column_index(SESSION_ID).unwrap();
        assert_eq!(cohort.rows()[0][specimen_idx], Value::Text("fish01".into()));
        assert_eq!(cohort.rows()[4][specimen_idx], Value::Text("fish02".into()));
        assert_eq!(cohort.rows()[0][session_idx], Value::Text("s1".into()));

        assert_eq!(report.specimen_files[1], report.specimen_dir.join("fish02.csv"));
        let copy = Table::from_csv(&report.specimen_files[1]).unwrap();
        assert_eq!(copy.n_rows(), 2);

        // Sources stay in place.
        assert!(root.path().join("fish01").join("merged.csv").is_file());
    }

    #[test]
    fn test_consolidate_without_session_writes_missing() {
        let root = tempdir().unwrap();
        let out = tempdir().unwrap();
        write_merged(root.path(), "fish01", 1);

        let report = consolidate_cohort(root.path(), out.path(), "merged.csv", None).unwrap();
        let cohort = Table::from_csv(&report.cohort_table).unwrap();
        let session_idx = cohort.column_index(SESSION_ID).unwrap();
        assert!(cohort.rows()[0][session_idx].is_missing());
    }

    #[test]
    fn test_consolidate_rejects_off_schema_table() {
        let root = tempdir().unwrap();
        let out = tempdir().unwrap();
        let folder = root.path().join("fish01");
        fs::create_dir(&folder).unwrap();
        fs::write(folder.join("merged.csv"), "label,area\n1,10\n").unwrap();

        assert!(matches!(
            consolidate_cohort(root.path(), out.path(), "merged.csv", None),
            Err(MorphError::NoDataFound(_))
        ));
    }

    #[test]
    fn test_consolidate_specimens_reads_only_listed_tables() {
        let root = tempdir().unwrap();
        let out = tempdir().unwrap();
        write_merged(root.path(), "fish01", 2);
        write_merged(root.path(), "fish02", 3);
        write_merged(root.path(), "fish03", 4);

        // Left over from an earlier run.
        let stale = out.path().join(SPECIMEN_DIR);
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("fish09.csv"), "label\n1\n").unwrap();

        let sources = vec![
            ("fish03".to_string(), root.path().join("fish03").join("merged.csv")),
            ("fish01".to_string(), root.path().join("fish01").join("merged.csv")),
        ];
        let report = consolidate_specimens("wt", &sources, out.path(), None).unwrap();

        assert_eq!(report.cohort, "wt");
        assert_eq!(report.specimens, vec!["fish03", "fish01"]);
        assert_eq!(report.specimen_files.len(), 2);
        assert_eq!(report.n_rows, 6);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_consolidate_write_failure_is_not_skipped() {
        let root = tempdir().unwrap();
        let out = tempdir().unwrap();
        write_merged(root.path(), "fish01", 2);
        // A directory where the tagged copy should go.
        fs::create_dir_all(out.path().join(SPECIMEN_DIR).join("fish01.csv")).unwrap();

        let err = consolidate_cohort(root.path(), out.path(), "merged.csv", None).unwrap_err();
        assert!(!err.is_specimen_local());
    }
}
