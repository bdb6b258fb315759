//! Two-sample tests on residual distributions.


pub use compare::{compare_cohorts, compare_distributions, ComparisonResult, TestOutcome};
pub use ks::{ks_two_sample, KsMethod, KsResult};
pub use welch::{welch_t_test, TTestResult};
