//! Flat tabular data read from and written to comma-separated files.

use crate::error::{MorphError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Text written for a missing cell.
pub const MISSING: &str = "NA";

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Numeric value.
    Number(f64),
    /// Free text (identifiers, serialized coordinate sequences).
    Text(String),
    /// Missing value.
    Missing,
}

impl Value {
    /// Interpret a raw cell.
    ///
    /// Empty cells and `NA`/`NaN` spellings are missing; anything that parses
    /// as a float is numeric; everything else is text.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || matches!(trimmed, "NA" | "na" | "NaN" | "nan") {
            return Value::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_nan() => Value::Missing,
            Ok(v) => Value::Number(v),
            Err(_) => Value::Text(raw.to_string()),
        }
    }

    /// Wrap an optional number.
    pub fn from_option(value: Option<f64>) -> Self {
        match value {
            Some(v) if !v.is_nan() => Value::Number(v),
            _ => Value::Missing,
        }
    }

    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Try to get as f64.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Cell text as written to disk.
    pub fn render(&self) -> String {
        match self {
            Value::Number(v) if v.is_nan() => MISSING.to_string(),
            Value::Number(v) => v.to_string(),
            Value::Text(s) => s.clone(),
            Value::Missing => MISSING.to_string(),
        }
    }
}

/// An ordered set of named columns and rows of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Create a table from columns and rows, checking row widths.
    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Load a table from a comma-separated file with a header row.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path).map_err(|e| MorphError::unreadable(path, e))?;
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| MorphError::unreadable(path, e))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
            return Err(MorphError::schema(path, "missing header row"));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| MorphError::unreadable(path, e))?;
            rows.push(record.iter().map(Value::parse).collect());
        }

        Ok(Self { columns, rows })
    }

    /// Write the table to a comma-separated file with a header row.
    ///
    /// Parent directories are created; an existing file is overwritten after
    /// a warning.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        prepare_output_file(path)?;
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(Value::render))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Append a row.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(MorphError::InvalidParameter(format!(
                "row has {} cells, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in order.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Check if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Check if a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// All values of one column.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[index])
    }

    /// Append a column holding the same value on every row.
    pub fn with_constant_column(mut self, name: &str, value: Value) -> Self {
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(value.clone());
        }
        self
    }

    /// Copy of the table without the named columns; absent names are ignored.
    pub fn without_columns(&self, names: &[&str]) -> Self {
        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|&i| !names.contains(&self.columns[i].as_str()))
            .collect();
        Self {
            columns: keep.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        }
    }

    /// Copy of the table with exact duplicate rows removed.
    ///
    /// Rows are compared by their written form; the first occurrence of each
    /// row is kept and order is preserved.
    pub fn distinct(&self) -> Self {
        let mut seen: HashSet<Vec<String>> = HashSet::with_capacity(self.rows.len());
        let rows = self
            .rows
            .iter()
            .filter(|row| seen.insert(row.iter().map(Value::render).collect()))
            .cloned()
            .collect();
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Append all rows of `other`, which must have identical columns.
    pub fn extend(&mut self, other: Table) -> Result<()> {
        if other.columns != self.columns {
            return Err(MorphError::InvalidParameter(format!(
                "cannot append table with columns {:?} to table with columns {:?}",
                other.columns, self.columns
            )));
        }
        self.rows.extend(other.rows);
        Ok(())
    }
}

/// Create a directory and its parents if absent.
pub fn ensure_dir<P: AsRef<Path>>(dir: P) -> Result<()> {
    fs::create_dir_all(dir.as_ref())?;
    Ok(())
}

/// Make `path` ready to be written: create its parent directory and warn
/// when an existing file is about to be overwritten.
pub fn prepare_output_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    if path.exists() {
        tracing::warn!("Overwriting existing output {}", path.display());
    }
    Ok(())
}

/// CSV files directly inside `dir`, sorted by case-insensitive file name
/// (ties broken by the exact name).
pub fn list_csv_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir.as_ref())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort_by_key(|p| file_name_sort_key(p));
    Ok(files)
}

/// Sort key for case-insensitive lexical file-name order.
pub fn file_name_sort_key(path: &Path) -> (String, String) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (name.to_lowercase(), name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "label,x,area,note").unwrap();
        writeln!(file, "1,\"[1, 2, 3]\",10.5,first").unwrap();
        writeln!(file, "2,4.0,NA,").unwrap();
        writeln!(file, "3,5,12,third").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_value_parse() {
        assert_eq!(Value::parse("1.5"), Value::Number(1.5));
        assert_eq!(Value::parse(" 2 "), Value::Number(2.0));
        assert_eq!(Value::parse("NA"), Value::Missing);
        assert_eq!(Value::parse("NaN"), Value::Missing);
        assert_eq!(Value::parse(""), Value::Missing);
        assert_eq!(Value::parse("droplet1"), Value::Text("droplet1".into()));
    }

    #[test]
    fn test_load_table() {
        let file = create_test_csv();
        let table = Table::from_csv(file.path()).unwrap();

        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.columns(), &["label", "x", "area", "note"]);
        assert_eq!(table.rows()[0][1], Value::Text("[1, 2, 3]".into()));
        assert!(table.rows()[1][2].is_missing());
        assert!(table.rows()[1][3].is_missing());
        assert_eq!(table.rows()[2][2].as_number(), Some(12.0));
    }

    #[test]
    fn test_csv_roundtrip_preserves_cells() {
        let file = create_test_csv();
        let table = Table::from_csv(file.path()).unwrap();

        let dir = tempdir().unwrap();
        let out = dir.path().join("nested").join("copy.csv");
        table.to_csv(&out).unwrap();

        let loaded = Table::from_csv(&out).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_without_columns_and_distinct() {
        let table = Table::with_rows(
            vec!["x".into(), "area".into()],
            vec![
                vec![Value::Number(1.0), Value::Number(3.0)],
                vec![Value::Number(2.0), Value::Number(3.0)],
                vec![Value::Number(3.0), Value::Number(4.0)],
            ],
        )
        .unwrap();

        let stripped = table.without_columns(&["x", "y"]).distinct();
        assert_eq!(stripped.columns(), &["area"]);
        assert_eq!(stripped.n_rows(), 2);
        assert_eq!(stripped.rows()[0][0], Value::Number(3.0));
        assert_eq!(stripped.rows()[1][0], Value::Number(4.0));
    }

    #[test]
    fn test_push_row_width_mismatch() {
        let mut table = Table::new(vec!["a".into(), "b".into()]);
        assert!(table.push_row(vec![Value::Missing]).is_err());
    }

    #[test]
    fn test_list_csv_files_case_insensitive_order() {
        let dir = tempdir().unwrap();
        for name in ["b.csv", "A.csv", "c.CSV", "notes.txt"] {
            std::fs::write(dir.path().join(name), "h\n1\n").unwrap();
        }
        let names: Vec<String> = list_csv_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["A.csv", "b.csv", "c.CSV"]);
    }
}
