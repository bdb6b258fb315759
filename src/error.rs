//! Error types for the lipid-morph library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum MorphError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Cannot read {}: {detail}", path.display())]
    Unreadable { path: PathBuf, detail: String },

    #[error("Schema error in {}: {detail}", path.display())]
    Schema { path: PathBuf, detail: String },

    #[error("No matching droplets between coordinate and descriptor sources for specimen '{0}'")]
    EmptyJoin(String),

    #[error("No usable specimens found in '{0}'")]
    NoDataFound(String),

    #[error("Insufficient data in cohort '{cohort}': found {found}, at least {required} required")]
    InsufficientData {
        cohort: String,
        found: usize,
        required: usize,
    },

    #[error("Invalid value '{value}' in {}, row {row}, column '{column}'", path.display())]
    InvalidValue {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MorphError {
    /// Shorthand for a schema violation in `path`.
    pub fn schema(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        MorphError::Schema {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Shorthand for an input file that could not be opened or parsed.
    pub fn unreadable(path: impl Into<PathBuf>, detail: impl std::fmt::Display) -> Self {
        MorphError::Unreadable {
            path: path.into(),
            detail: detail.to_string(),
        }
    }

    /// Whether this error only invalidates a single specimen.
    ///
    /// Cohort-level stages skip such specimens and keep going; any other
    /// error (writing outputs, for one) aborts the stage.
    pub fn is_specimen_local(&self) -> bool {
        matches!(
            self,
            MorphError::Unreadable { .. }
                | MorphError::Schema { .. }
                | MorphError::EmptyJoin(_)
                | MorphError::InvalidValue { .. }
        )
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, MorphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specimen_local_errors() {
        assert!(MorphError::unreadable("a.csv", "no such file").is_specimen_local());
        assert!(MorphError::schema("a.csv", "missing column").is_specimen_local());
        assert!(MorphError::EmptyJoin("fish01".into()).is_specimen_local());

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        assert!(!MorphError::from(io).is_specimen_local());
        assert!(!MorphError::NoDataFound("control".into()).is_specimen_local());
    }
}
