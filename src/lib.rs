//! Lipid Droplet Morphometry Library
//!
//! This library consolidates per-specimen lipid droplet measurements into
//! analyzable tables and compares an experimental cohort with a control
//! baseline of droplet size scaling.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (Table, DropletRecord, SummaryTable) and the droplet schema
//! - **consolidate**: Merging sources, cohort consolidation, coordinate stripping, summaries
//! - **model**: P-spline baseline of mean Feret diameter on log total area, and deviations
//! - **test**: Location (Welch t) and shape (Kolmogorov-Smirnov) comparisons
//! - **pipeline**: Two-cohort run configuration and execution
//!
//! # Example
//!
//! ```no_run
//! use lipid_morph::prelude::*;
//!
//! let control = summarize_dir("out/control/stripped").unwrap();
//! let treated = summarize_dir("out/treated/stripped").unwrap();
//!
//! let model = fit_baseline(&control, "control", &BaselineConfig::default()).unwrap();
//! let deviations = evaluate_deviations(&model, &treated, "treated").unwrap();
//! let comparison =
//!     compare_cohorts("control", model.residuals(), "treated", &deviations.values()).unwrap();
//! println!("{}", comparison);
//! ```

pub mod consolidate;
pub mod data;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod test;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::consolidate::{
        consolidate_cohort, consolidate_specimens, merge_cohort, merge_cohort_into, merge_records,
        merge_specimen_files, strip_coordinates, strip_dir, strip_files, summarize_dir,
        summarize_files, summarize_table, summarize_tables, ConsolidationReport, FileLayout,
        MergeReport, StripReport,
    };
    pub use crate::data::{
        DropletRecord, ShapeDescriptors, SpecimenSummary, SpecimenTable, SummaryTable, Table,
        Value,
    };
    pub use crate::error::{MorphError, Result};
    pub use crate::model::{
        evaluate_deviations, fit_baseline, BaselineConfig, BaselineModel, Deviation, DeviationSet,
    };
    pub use crate::pipeline::{run, CohortConfig, RunConfig, RunReport};
    pub use crate::test::{
        compare_cohorts, compare_distributions, ks_two_sample, welch_t_test, ComparisonResult,
        KsResult, TTestResult, TestOutcome,
    };
}
