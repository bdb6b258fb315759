//! Reducing droplet-level tables to one row of statistics per specimen.

use crate::data::schema::{self, ColumnKind, AREA};
use crate::data::{list_csv_files, SpecimenSummary, SummaryTable, Table, Value};
use crate::error::{MorphError, Result};
use std::path::{Path, PathBuf};

/// Compensated (Neumaier) sum of the numeric cells.
fn compensated_sum<'a>(values: impl Iterator<Item = &'a Value>) -> Option<(f64, usize)> {
    let mut sum: f64 = 0.0;
    let mut compensation: f64 = 0.0;
    let mut n = 0usize;
    for v in values.filter_map(Value::as_number) {
        let t = sum + v;
        if sum.abs() >= v.abs() {
            compensation += (sum - t) + v;
        } else {
            compensation += (v - t) + sum;
        }
        sum = t;
        n += 1;
    }
    (n > 0).then_some((sum + compensation, n))
}

/// Kind of a column within one table.
///
/// Columns declared by the schema keep their declared kind; other columns
/// are numeric when every present value is a number.
fn resolve_kind(table: &Table, index: usize) -> ColumnKind {
    let name = &table.columns()[index];
    schema::column_kind(name).unwrap_or_else(|| {
        let all_numeric = table
            .column_values(index)
            .all(|v| matches!(v, Value::Number(_) | Value::Missing));
        if all_numeric {
            ColumnKind::Numeric
        } else {
            ColumnKind::Identifier
        }
    })
}

fn column_mean(table: &Table, index: usize) -> Option<f64> {
    match resolve_kind(table, index) {
        ColumnKind::Identifier => None,
        ColumnKind::Numeric => {
            compensated_sum(table.column_values(index)).map(|(sum, n)| sum / n as f64)
        }
    }
}

fn summarize_one(file_name: &str, table: &Table, mean_columns: &[String]) -> SpecimenSummary {
    let area_sum = table
        .column_index(AREA)
        .and_then(|i| compensated_sum(table.column_values(i)))
        .map(|(sum, _)| sum);

    let means = mean_columns
        .iter()
        .map(|c| table.column_index(c).and_then(|i| column_mean(table, i)))
        .collect();

    if table.is_empty() {
        tracing::warn!("Specimen table '{}' has no droplets; summary is undefined", file_name);
    }

    SpecimenSummary {
        file_name: file_name.to_string(),
        area_sum,
        means,
    }
}

/// Summarize named specimen tables, one row per table in input order.
///
/// `area_sum` is the sum of `area` (missing when the column is absent or
/// holds no values). Every other column gets a mean column: the mean of the
/// present values for numeric columns, missing for identifier and text
/// columns. The mean columns are the union of all tables' columns in
/// first-seen order.
pub fn summarize_tables(tables: &[(String, Table)]) -> SummaryTable {
    let mut mean_columns: Vec<String> = Vec::new();
    for (_, table) in tables {
        for c in table.columns() {
            if c != AREA && !mean_columns.contains(c) {
                mean_columns.push(c.clone());
            }
        }
    }

    let rows = tables
        .iter()
        .map(|(name, table)| summarize_one(name, table, &mean_columns))
        .collect();

    SummaryTable { mean_columns, rows }
}

/// Summarize a single specimen table.
pub fn summarize_table(file_name: &str, table: &Table) -> SummaryTable {
    summarize_tables(&[(file_name.to_string(), table.clone())])
}

/// Summarize the given stripped specimen tables, in the order given.
///
/// Every table must carry the stripped schema; a table written by another
/// stage or tool fails with a schema error instead of being summarized.
///
/// # Errors
/// `NoDataFound` when `files` is empty; `Schema` for an off-schema table.
pub fn summarize_files(files: &[PathBuf]) -> Result<SummaryTable> {
    if files.is_empty() {
        return Err(MorphError::NoDataFound("empty table list".to_string()));
    }

    let required = schema::stripped_columns();
    let mut tables = Vec::with_capacity(files.len());
    for path in files {
        let table = Table::from_csv(path)?;
        schema::require_columns(table.columns(), &required, path, "stripped table")?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tables.push((name, table));
    }

    let summary = summarize_tables(&tables);
    tracing::info!("Summarized {} specimens", summary.len());
    Ok(summary)
}

/// Summarize every CSV file in `dir`, in case-insensitive file-name order.
///
/// # Errors
/// `NoDataFound` when the directory holds no CSV files.
pub fn summarize_dir<P: AsRef<Path>>(dir: P) -> Result<SummaryTable> {
    let dir = dir.as_ref();
    let files = list_csv_files(dir)?;
    if files.is_empty() {
        return Err(MorphError::NoDataFound(dir.display().to_string()));
    }
    tracing::debug!("Summarizing {} tables from {}", files.len(), dir.display());
    summarize_files(&files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::strip_coordinates;
    use crate::data::schema::{SESSION_ID, SPECIMEN_ID};
    use crate::data::{DropletRecord, ShapeDescriptors, SpecimenTable};
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    fn droplets(rows: &[(f64, f64)], specimen: &str) -> Table {
        Table::with_rows(
            vec!["label".into(), "area".into(), "feret_diameter".into(), "specimen_id".into()],
            rows.iter()
                .enumerate()
                .map(|(i, (area, feret))| {
                    vec![
                        Value::Number(i as f64 + 1.0),
                        Value::Number(*area),
                        Value::Number(*feret),
                        Value::Text(specimen.into()),
                    ]
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_two_specimen_scenario() {
        let tables = vec![
            ("fish01.csv".to_string(), droplets(&[(10.0, 5.0); 3], "fish01")),
            ("fish02.csv".to_string(), droplets(&[(20.0, 8.0); 2], "fish02")),
        ];
        let summary = summarize_tables(&tables);

        assert_eq!(summary.len(), 2);
        assert_eq!(summary.rows[0].area_sum, Some(30.0));
        assert_eq!(summary.rows[1].area_sum, Some(40.0));
        assert_eq!(summary.means_of("feret_diameter").unwrap(), vec![Some(5.0), Some(8.0)]);
    }

    #[test]
    fn test_identifier_columns_summarize_to_missing() {
        let summary = summarize_table("fish01.csv", &droplets(&[(10.0, 5.0)], "fish01"));
        assert_eq!(
            summary.header(),
            vec![
                "file_name",
                "area_sum",
                "label_mean",
                "feret_diameter_mean",
                "specimen_id_mean"
            ]
        );
        assert_eq!(summary.rows[0].means, vec![None, Some(5.0), None]);
    }

    #[test]
    fn test_area_sum_equal_areas() {
        let summary = summarize_table("a.csv", &droplets(&[(7.0, 1.0); 9], "a"));
        assert_eq!(summary.rows[0].area_sum, Some(63.0));

        let summary = summarize_table("b.csv", &droplets(&[(0.1, 1.0); 10], "b"));
        assert_relative_eq!(summary.rows[0].area_sum.unwrap(), 1.0, max_relative = 1e-15);
    }

    #[test]
    fn test_missing_values_ignored() {
        let table = Table::with_rows(
            vec!["area".into(), "solidity".into(), "note".into()],
            vec![
                vec![Value::Number(4.0), Value::Missing, Value::Text("a".into())],
                vec![Value::Missing, Value::Number(0.8), Value::Missing],
                vec![Value::Number(6.0), Value::Number(0.9), Value::Text("b".into())],
            ],
        )
        .unwrap();
        let summary = summarize_table("s.csv", &table);
        assert_eq!(summary.rows[0].area_sum, Some(10.0));
        assert_relative_eq!(summary.rows[0].means[0].unwrap(), 0.85, epsilon = 1e-12);
        assert_eq!(summary.rows[0].means[1], None);
    }

    #[test]
    fn test_empty_table_is_undefined() {
        let table = Table::new(vec!["area".into(), "feret_diameter".into()]);
        let summary = summarize_table("empty.csv", &table);
        assert!(summary.rows[0].is_undefined());
    }

    #[test]
    fn test_no_area_column_is_missing_not_zero() {
        let table = Table::with_rows(vec!["feret_diameter".into()], vec![vec![Value::Number(2.0)]]).unwrap();
        let summary = summarize_table("s.csv", &table);
        assert_eq!(summary.rows[0].area_sum, None);
        assert_eq!(summary.rows[0].means, vec![Some(2.0)]);
    }

    /// A stripped specimen table, as the strip stage writes it.
    fn stripped(rows: &[(f64, f64)], specimen: &str) -> Table {
        let table = SpecimenTable {
            specimen: specimen.to_string(),
            records: rows
                .iter()
                .enumerate()
                .map(|(i, (area, feret))| DropletRecord {
                    label: i as i64 + 1,
                    x: Value::Number(0.0),
                    y: Value::Number(0.0),
                    descriptors: ShapeDescriptors {
                        area: Some(*area),
                        feret_diameter: Some(*feret),
                        ..Default::default()
                    },
                })
                .collect(),
        }
        .to_table()
        .unwrap()
        .with_constant_column(SPECIMEN_ID, Value::Text(specimen.into()))
        .with_constant_column(SESSION_ID, Value::Missing);
        strip_coordinates(&table)
    }

    #[test]
    fn test_summarize_dir_orders_case_insensitively() {
        let dir = tempdir().unwrap();
        stripped(&[(1.0, 1.0)], "b").to_csv(dir.path().join("b.csv")).unwrap();
        stripped(&[(2.0, 1.0)], "A").to_csv(dir.path().join("A.csv")).unwrap();
        stripped(&[(3.0, 1.0)], "c").to_csv(dir.path().join("c.csv")).unwrap();

        let summary = summarize_dir(dir.path()).unwrap();
        let names: Vec<&str> = summary.rows.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["A.csv", "b.csv", "c.csv"]);
        assert_eq!(summary.rows[0].area_sum, Some(2.0));
        assert_eq!(summary.means_of("feret_diameter").unwrap(), vec![Some(1.0); 3]);
    }

    #[test]
    fn test_summarize_dir_rejects_off_schema_table() {
        let dir = tempdir().unwrap();
        stripped(&[(1.0, 1.0)], "fish01").to_csv(dir.path().join("fish01.csv")).unwrap();
        droplets(&[(2.0, 1.0)], "notes").to_csv(dir.path().join("notes.csv")).unwrap();

        match summarize_dir(dir.path()) {
            Err(MorphError::Schema { path, detail }) => {
                assert!(path.ends_with("notes.csv"));
                assert!(detail.contains("session_id"));
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_summarize_files_in_given_order() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        stripped(&[(1.0, 1.0)], "a").to_csv(&a).unwrap();
        stripped(&[(5.0, 2.0), (5.0, 4.0)], "b").to_csv(&b).unwrap();
        stripped(&[(9.0, 9.0)], "c").to_csv(dir.path().join("c.csv")).unwrap();

        let summary = summarize_files(&[b, a]).unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary.rows[0].file_name, "b.csv");
        assert_eq!(summary.rows[0].area_sum, Some(10.0));
        assert_eq!(summary.means_of("feret_diameter").unwrap(), vec![Some(3.0), Some(1.0)]);
    }

    #[test]
    fn test_summarize_empty_dir() {
        let dir = tempdir().unwrap();
        assert!(matches!(summarize_dir(dir.path()), Err(MorphError::NoDataFound(_))));
        assert!(matches!(summarize_files(&[]), Err(MorphError::NoDataFound(_))));
    }
}
