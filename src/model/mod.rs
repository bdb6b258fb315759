//! The control baseline model and deviations from it.

pub mod baseline;
pub mod deviation;
pub mod spline;

pub use baseline::{fit_baseline, BaselineConfig, BaselineModel, ModelPoint};
pub use deviation::{evaluate_deviations, Deviation, DeviationSet};
pub use spline::{BSplineBasis, PenalizedFit};
