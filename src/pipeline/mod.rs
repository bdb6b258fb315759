//! Composing the stages into a two-cohort run.

mod runner;

pub use runner::{
    process_cohort, run, CohortConfig, CohortReport, ModelReport, RunConfig, RunReport,
    BASELINE_FIT_FILE, COMPARISON_FILE, CONSOLIDATED_DIR, CONTROL_DIR, DEVIATIONS_FILE,
    EXPERIMENTAL_DIR, MERGED_DIR, REPORT_FILE, STRIPPED_DIR, SUMMARY_FILE,
};
