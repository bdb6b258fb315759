//! Versioned column schema shared by every pipeline stage.
//!
//! Stages resolve columns through this module instead of matching raw header
//! strings, so a renamed or missing column fails fast with a schema error
//! rather than silently producing missing values downstream.

use crate::error::{MorphError, Result};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Version of the on-disk column layout written by this crate.
pub const SCHEMA_VERSION: u32 = 1;

/// Offset added to zero-based segmentation labels to align them with the
/// one-based droplet indices of the measurement tool.
pub const LABEL_OFFSET: i64 = 1;

pub const LABEL: &str = "label";
pub const X: &str = "x";
pub const Y: &str = "y";
pub const AREA: &str = "area";
pub const FERET_DIAMETER: &str = "feret_diameter";
pub const SPECIMEN_ID: &str = "specimen_id";
pub const SESSION_ID: &str = "session_id";
pub const FILE_NAME: &str = "file_name";
pub const AREA_SUM: &str = "area_sum";

/// Label column of the coordinate source.
pub const SOURCE_LABEL: &str = "Label";

/// Suffix of per-specimen mean columns in the summary table.
pub const MEAN_SUFFIX: &str = "_mean";

/// A shape descriptor: the measurement tool's header and our column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub source: &'static str,
    pub column: &'static str,
}

/// Shape descriptors projected into every merged table, in output order.
pub const DESCRIPTORS: [Descriptor; 13] = [
    Descriptor { source: "Area", column: AREA },
    Descriptor { source: "Perim.", column: "perimeter" },
    Descriptor { source: "Circ.", column: "circularity" },
    Descriptor { source: "Feret", column: FERET_DIAMETER },
    Descriptor { source: "FeretX", column: "feret_x" },
    Descriptor { source: "FeretY", column: "feret_y" },
    Descriptor { source: "FeretAngle", column: "feret_angle" },
    Descriptor { source: "MinFeret", column: "min_feret" },
    Descriptor { source: "AR", column: "aspect_ratio" },
    Descriptor { source: "Round", column: "roundness" },
    Descriptor { source: "Solidity", column: "solidity" },
    Descriptor { source: "MinThr", column: "min_threshold" },
    Descriptor { source: "MaxThr", column: "max_threshold" },
];

/// Columns of a per-specimen merged table.
pub fn droplet_columns() -> Vec<String> {
    [LABEL, X, Y]
        .into_iter()
        .chain(DESCRIPTORS.iter().map(|d| d.column))
        .map(str::to_string)
        .collect()
}

/// Columns of a consolidated (tagged) cohort table.
pub fn cohort_columns() -> Vec<String> {
    let mut columns = droplet_columns();
    columns.push(SPECIMEN_ID.to_string());
    columns.push(SESSION_ID.to_string());
    columns
}

/// Columns of a stripped specimen table: the cohort columns without coordinates.
pub fn stripped_columns() -> Vec<String> {
    cohort_columns()
        .into_iter()
        .filter(|c| c != X && c != Y)
        .collect()
}

/// Check that every `required` column is present, naming all missing ones.
///
/// `stage` describes the table being checked, e.g. "merged table".
pub fn require_columns(
    columns: &[String],
    required: &[String],
    path: &Path,
    stage: &str,
) -> Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .filter(|c| !columns.contains(c))
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(MorphError::schema(
        path,
        format!(
            "{} does not match schema v{}: missing columns {:?}",
            stage, SCHEMA_VERSION, missing
        ),
    ))
}

/// How a column is treated when summarizing a specimen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Averaged across droplets.
    Numeric,
    /// Identifies a droplet or specimen; summarizes to missing.
    Identifier,
}

/// Declared kind of a known column, `None` for columns outside the schema.
pub fn column_kind(name: &str) -> Option<ColumnKind> {
    match name {
        LABEL | X | Y | SPECIMEN_ID | SESSION_ID | FILE_NAME => Some(ColumnKind::Identifier),
        _ if DESCRIPTORS.iter().any(|d| d.column == name) => Some(ColumnKind::Numeric),
        _ => None,
    }
}

/// Name of the summary column holding the mean of `column`.
pub fn mean_column(column: &str) -> String {
    format!("{}{}", column, MEAN_SUFFIX)
}

fn suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+?)(?:\.[xy]|[._]\d+)$").expect("valid suffix pattern"))
}

fn non_digit_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\D").expect("valid digit pattern"))
}

/// Canonical form of a source header: trimmed, with join disambiguation
/// suffixes (`Area.y`, `Area.1`, `Area_1`) removed.
pub fn canonical_header(raw: &str) -> String {
    let trimmed = raw.trim();
    match suffix_regex().captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

/// Position of `wanted` among `headers` after canonicalization.
///
/// An exact header match wins over a canonicalized one, so a table holding
/// both `Area` and `Area.1` resolves to the undecorated column.
pub fn find_source_column(headers: &[String], wanted: &str, ignore_case: bool) -> Option<usize> {
    let eq = |a: &str, b: &str| {
        if ignore_case {
            a.eq_ignore_ascii_case(b)
        } else {
            a == b
        }
    };
    headers
        .iter()
        .position(|h| eq(h.trim(), wanted))
        .or_else(|| headers.iter().position(|h| eq(&canonical_header(h), wanted)))
}

/// Droplet index embedded in a measurement-tool identifier.
///
/// All non-digit characters are removed and the rest parsed, so
/// `"specimen3.tif:droplet12"` yields `312`. Identifiers are expected to carry
/// only the droplet index as digits.
pub fn extract_droplet_index(identifier: &str) -> Option<i64> {
    let digits = non_digit_regex().replace_all(identifier, "");
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
