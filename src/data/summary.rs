//! Per-specimen summary statistics.

use crate::data::schema::{self, AREA_SUM, FILE_NAME, MEAN_SUFFIX};
use crate::data::table::{Table, Value};
use crate::error::{MorphError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One row of the summary table: the statistics of a single specimen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecimenSummary {
    /// Name of the file the specimen was read from.
    pub file_name: String,
    /// Sum of droplet areas; `None` when no area was measured.
    pub area_sum: Option<f64>,
    /// Per-column means, aligned with [`SummaryTable::mean_columns`].
    pub means: Vec<Option<f64>>,
}

impl SpecimenSummary {
    /// Check if the summary carries no statistics at all.
    pub fn is_undefined(&self) -> bool {
        self.area_sum.is_none() && self.means.iter().all(Option::is_none)
    }
}

/// Summary statistics for a cohort, one row per specimen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTable {
    /// Source columns that were averaged, without the `_mean` suffix.
    pub mean_columns: Vec<String>,
    /// Rows in file enumeration order.
    pub rows: Vec<SpecimenSummary>,
}

impl SummaryTable {
    /// Number of specimens.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a source column among the averaged columns.
    pub fn mean_index(&self, column: &str) -> Option<usize> {
        self.mean_columns.iter().position(|c| c == column)
    }

    /// Means of one source column for every specimen.
    pub fn means_of(&self, column: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.mean_index(column)?;
        Some(self.rows.iter().map(|r| r.means[idx]).collect())
    }

    /// Get the summary of a specific file.
    pub fn get(&self, file_name: &str) -> Option<&SpecimenSummary> {
        self.rows.iter().find(|r| r.file_name == file_name)
    }

    /// Column names of the written table.
    pub fn header(&self) -> Vec<String> {
        let mut header = vec![FILE_NAME.to_string(), AREA_SUM.to_string()];
        header.extend(self.mean_columns.iter().map(|c| schema::mean_column(c)));
        header
    }

    /// Convert to a flat table.
    pub fn to_table(&self) -> Result<Table> {
        let rows = self
            .rows
            .iter()
            .map(|r| {
                let mut row = vec![Value::Text(r.file_name.clone()), Value::from_option(r.area_sum)];
                row.extend(r.means.iter().map(|m| Value::from_option(*m)));
                row
            })
            .collect();
        Table::with_rows(self.header(), rows)
    }

    /// Write the summary table.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.to_table()?.to_csv(path)
    }

    /// Load a summary table written by [`SummaryTable::to_csv`].
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let table = Table::from_csv(path)?;

        let file_idx = table
            .column_index(FILE_NAME)
            .ok_or_else(|| MorphError::schema(path, format!("missing column '{}'", FILE_NAME)))?;
        let area_idx = table
            .column_index(AREA_SUM)
            .ok_or_else(|| MorphError::schema(path, format!("missing column '{}'", AREA_SUM)))?;

        let mean_cols: Vec<(usize, String)> = table
            .columns()
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.strip_suffix(MEAN_SUFFIX).map(|base| (i, base.to_string())))
            .collect();

        let rows = table
            .rows()
            .iter()
            .map(|row| SpecimenSummary {
                file_name: row[file_idx].render(),
                area_sum: row[area_idx].as_number(),
                means: mean_cols.iter().map(|(i, _)| row[*i].as_number()).collect(),
            })
            .collect();

        Ok(Self {
            mean_columns: mean_cols.into_iter().map(|(_, c)| c).collect(),
            rows,
        })
    }
}
