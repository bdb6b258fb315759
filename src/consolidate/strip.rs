//! Removing spatial coordinates and collapsing duplicate rows.

use crate::data::schema::{self, SPECIMEN_ID, X, Y};
use crate::data::{ensure_dir, list_csv_files, Table};
use crate::error::{MorphError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Outcome of stripping a set of tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StripReport {
    /// Files written.
    pub files: Vec<PathBuf>,
    pub rows_before: usize,
    pub rows_after: usize,
}

impl StripReport {
    /// Rows removed as duplicates.
    pub fn n_collapsed(&self) -> usize {
        self.rows_before - self.rows_after
    }
}

/// Drop the `x`/`y` columns and exact duplicate rows.
///
/// Tables without coordinate columns are returned unchanged, which makes
/// the operation idempotent. Distinct droplets of one specimen that share
/// every remaining value are collapsed as well.
pub fn strip_coordinates(table: &Table) -> Table {
    if !table.has_column(X) && !table.has_column(Y) {
        return table.clone();
    }
    table.without_columns(&[X, Y]).distinct()
}

/// Strip one consolidated table file.
///
/// The table must already be tagged with every column of the consolidated
/// schema (coordinates aside): de-duplicating untagged tables could merge
/// rows of different specimens.
pub fn strip_file<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Result<(usize, usize)> {
    let input = input.as_ref();
    let table = Table::from_csv(input)?;
    if !table.has_column(SPECIMEN_ID) {
        return Err(MorphError::schema(
            input,
            format!("missing '{}'; consolidate the cohort before stripping", SPECIMEN_ID),
        ));
    }
    let required = schema::stripped_columns();
    schema::require_columns(table.columns(), &required, input, "consolidated table")?;
    let stripped = strip_coordinates(&table);
    stripped.to_csv(output)?;
    Ok((table.n_rows(), stripped.n_rows()))
}

/// Strip the given tables into `output_dir`, keeping file names.
pub fn strip_files<Q: AsRef<Path>>(inputs: &[PathBuf], output_dir: Q) -> Result<StripReport> {
    let output_dir = output_dir.as_ref();
    ensure_dir(output_dir)?;

    let mut report = StripReport::default();
    for input in inputs {
        let Some(name) = input.file_name() else {
            continue;
        };
        let output = output_dir.join(name);
        let (before, after) = strip_file(input, &output)?;
        report.rows_before += before;
        report.rows_after += after;
        report.files.push(output);
    }

    tracing::info!(
        "Stripped coordinates from {} tables ({} duplicate rows collapsed)",
        report.files.len(),
        report.n_collapsed()
    );
    Ok(report)
}

/// Strip every CSV file in `input_dir` into `output_dir`, keeping file names.
pub fn strip_dir<P: AsRef<Path>, Q: AsRef<Path>>(input_dir: P, output_dir: Q) -> Result<StripReport> {
    strip_files(&list_csv_files(input_dir.as_ref())?, output_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema::{AREA, SESSION_ID};
    use crate::data::{DropletRecord, ShapeDescriptors, SpecimenTable, Value};
    use tempfile::tempdir;

    /// A consolidated table: droplets `(x, area)` of one specimen, tagged.
    fn specimen(name: &str, droplets: &[(f64, f64)]) -> Table {
        SpecimenTable {
            specimen: name.to_string(),
            records: droplets
                .iter()
                .map(|(x, area)| DropletRecord {
                    label: 1,
                    x: Value::Number(*x),
                    y: Value::Number(x * 2.0),
                    descriptors: ShapeDescriptors {
                        area: Some(*area),
                        ..Default::default()
                    },
                })
                .collect(),
        }
        .to_table()
        .unwrap()
        .with_constant_column(SPECIMEN_ID, Value::Text(name.into()))
        .with_constant_column(SESSION_ID, Value::Missing)
    }

    fn tagged_table() -> Table {
        let mut table = specimen("fish01", &[(1.0, 10.0), (2.0, 10.0)]);
        table
            .extend(specimen("fish02", &[(3.0, 10.0), (4.0, 12.0)]))
            .unwrap();
        table
    }

    #[test]
    fn test_strip_removes_coordinates_and_duplicates() {
        let stripped = strip_coordinates(&tagged_table());
        assert_eq!(stripped.columns(), schema::stripped_columns().as_slice());
        // fish01's two droplets collapse; fish02's identical area stays separate.
        assert_eq!(stripped.n_rows(), 3);
        let specimen_idx = stripped.column_index(SPECIMEN_ID).unwrap();
        assert_eq!(stripped.rows()[1][specimen_idx], Value::Text("fish02".into()));
        let area_idx = stripped.column_index(AREA).unwrap();
        assert_eq!(stripped.rows()[2][area_idx], Value::Number(12.0));
    }

    #[test]
    fn test_strip_is_idempotent() {
        let once = strip_coordinates(&tagged_table());
        let twice = strip_coordinates(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_table_without_coordinates_passes_through() {
        let table = Table::with_rows(
            vec!["area".into()],
            vec![vec![Value::Number(1.0)], vec![Value::Number(1.0)]],
        )
        .unwrap();
        assert_eq!(strip_coordinates(&table), table);
    }

    #[test]
    fn test_strip_file_requires_tagging() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("untagged.csv");
        std::fs::write(&input, "x,y,area\n1,2,10\n").unwrap();
        assert!(matches!(
            strip_file(&input, dir.path().join("out.csv")),
            Err(MorphError::Schema { .. })
        ));
    }

    #[test]
    fn test_strip_file_rejects_partial_schema() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("partial.csv");
        std::fs::write(&input, "x,y,area,specimen_id\n1,2,10,fish01\n").unwrap();
        match strip_file(&input, dir.path().join("out.csv")) {
            Err(MorphError::Schema { detail, .. }) => assert!(detail.contains("feret_diameter")),
            other => panic!("expected schema error, got {:?}", other),
        }
        assert!(!dir.path().join("out.csv").exists());
    }

    #[test]
    fn test_strip_dir() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        tagged_table().to_csv(input.path().join("fish.csv")).unwrap();

        let report = strip_dir(input.path(), output.path()).unwrap();
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.rows_before, 4);
        assert_eq!(report.rows_after, 3);
        assert_eq!(report.n_collapsed(), 1);
        let written = Table::from_csv(output.path().join("fish.csv")).unwrap();
        assert!(!written.has_column("x"));
    }

    #[test]
    fn test_strip_files_only_touches_listed_inputs() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        let listed = input.path().join("fish01.csv");
        specimen("fish01", &[(1.0, 10.0)]).to_csv(&listed).unwrap();
        specimen("fish02", &[(1.0, 10.0)]).to_csv(input.path().join("fish02.csv")).unwrap();

        let report = strip_files(&[listed], output.path()).unwrap();
        assert_eq!(report.files, vec![output.path().join("fish01.csv")]);
        assert!(!output.path().join("fish02.csv").exists());
    }
}
