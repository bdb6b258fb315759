//! Deviations of specimens from a fitted baseline.

use crate::data::schema::{AREA_SUM, FILE_NAME};
use crate::data::{SummaryTable, Table, Value};
use crate::error::{MorphError, Result};
use crate::model::baseline::{usable_points, BaselineModel};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Deviation of one specimen from the baseline prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deviation {
    pub file_name: String,
    pub area_sum: f64,
    /// Observed mean Feret diameter.
    pub observed: f64,
    /// Baseline prediction at the specimen's area sum.
    pub predicted: f64,
    /// `observed − predicted`.
    pub deviation: f64,
    /// Prediction lies outside the control range of `ln(area_sum)`.
    pub extrapolated: bool,
}

/// Deviations of a whole cohort, in summary row order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviationSet {
    pub cohort: String,
    pub deviations: Vec<Deviation>,
    /// Specimens without a usable area sum or diameter.
    pub skipped: Vec<String>,
}

impl DeviationSet {
    /// Deviation values in row order.
    pub fn values(&self) -> Vec<f64> {
        self.deviations.iter().map(|d| d.deviation).collect()
    }

    pub fn len(&self) -> usize {
        self.deviations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deviations.is_empty()
    }

    /// Number of specimens predicted by extrapolation.
    pub fn n_extrapolated(&self) -> usize {
        self.deviations.iter().filter(|d| d.extrapolated).count()
    }

    /// Convert to a flat table.
    pub fn to_table(&self) -> Result<Table> {
        let columns = [FILE_NAME, AREA_SUM, "observed", "predicted", "deviation", "extrapolated"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let rows = self
            .deviations
            .iter()
            .map(|d| {
                vec![
                    Value::Text(d.file_name.clone()),
                    Value::Number(d.area_sum),
                    Value::Number(d.observed),
                    Value::Number(d.predicted),
                    Value::Number(d.deviation),
                    Value::Text(d.extrapolated.to_string()),
                ]
            })
            .collect();
        Table::with_rows(columns, rows)
    }

    /// Write the deviation table.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.to_table()?.to_csv(path)
    }
}

/// Compute `observed − predicted` for every usable specimen of a summary.
///
/// The model is only read. Specimens whose area sum falls outside the
/// control range are still evaluated, flagged and logged.
///
/// # Errors
/// `NoDataFound` when no specimen of the summary is usable.
pub fn evaluate_deviations(model: &BaselineModel, summary: &SummaryTable, cohort: &str) -> Result<DeviationSet> {
    let (points, skipped) = usable_points(summary, cohort)?;
    if points.is_empty() {
        return Err(MorphError::NoDataFound(cohort.to_string()));
    }

    let deviations: Vec<Deviation> = points
        .into_iter()
        .map(|p| {
            let predicted = model.predict_log(p.log_area());
            let extrapolated = model.is_extrapolation(p.area_sum);
            Deviation {
                deviation: p.feret_diameter - predicted,
                file_name: p.file_name,
                area_sum: p.area_sum,
                observed: p.feret_diameter,
                predicted,
                extrapolated,
            }
        })
        .collect();

    let set = DeviationSet {
        cohort: cohort.to_string(),
        deviations,
        skipped,
    };
    if set.n_extrapolated() > 0 {
        let (lo, hi) = model.log_range();
        tracing::warn!(
            "Cohort '{}': {} of {} specimens lie outside the control range ln(area_sum) in [{:.3}, {:.3}]; predictions are extrapolated",
            cohort,
            set.n_extrapolated(),
            set.len(),
            lo,
            hi
        );
    }
    tracing::info!(
        "Evaluated {} specimens of cohort '{}' against baseline '{}'",
        set.len(),
        cohort,
        model.cohort
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SpecimenSummary;
    use crate::model::baseline::{fit_baseline, BaselineConfig};
    use approx::assert_abs_diff_eq;

    fn summary(points: &[(f64, f64)]) -> SummaryTable {
        SummaryTable {
            mean_columns: vec!["feret_diameter".into()],
            rows: points
                .iter()
                .enumerate()
                .map(|(i, (area, feret))| SpecimenSummary {
                    file_name: format!("s{:02}.csv", i),
                    area_sum: Some(*area),
                    means: vec![Some(*feret)],
                })
                .collect(),
        }
    }

    fn control() -> SummaryTable {
        let points: Vec<(f64, f64)> = (0..16)
            .map(|i| {
                let x = 3.0 + 0.25 * i as f64;
                let wiggle = if i % 2 == 0 { 0.03 } else { -0.03 };
                (x.exp(), 0.5 + 0.4 * x + wiggle)
            })
            .collect();
        summary(&points)
    }

    #[test]
    fn test_control_deviations_equal_residuals() {
        let control = control();
        let model = fit_baseline(&control, "control", &BaselineConfig::default()).unwrap();
        let set = evaluate_deviations(&model, &control, "control").unwrap();

        assert_eq!(set.len(), model.residuals().len());
        for (d, r) in set.values().iter().zip(model.residuals()) {
            assert_abs_diff_eq!(*d, *r, epsilon = 1e-9);
        }
        assert_eq!(set.n_extrapolated(), 0);
    }

    #[test]
    fn test_out_of_range_specimens_are_flagged() {
        let model = fit_baseline(&control(), "control", &BaselineConfig::default()).unwrap();
        let experimental = summary(&[(f64::exp(4.0), 2.5), (f64::exp(9.0), 4.0)]);
        let set = evaluate_deviations(&model, &experimental, "treated").unwrap();

        assert!(!set.deviations[0].extrapolated);
        assert!(set.deviations[1].extrapolated);
        assert_eq!(set.n_extrapolated(), 1);
        assert_abs_diff_eq!(set.deviations[1].deviation, 4.0 - set.deviations[1].predicted, epsilon = 1e-12);
    }

    #[test]
    fn test_model_is_not_modified() {
        let model = fit_baseline(&control(), "control", &BaselineConfig::default()).unwrap();
        let before = model.residuals().to_vec();
        let experimental = summary(&[(f64::exp(3.5), 2.0)]);
        evaluate_deviations(&model, &experimental, "treated").unwrap();
        assert_eq!(model.residuals(), before.as_slice());
    }

    #[test]
    fn test_no_usable_specimens() {
        let model = fit_baseline(&control(), "control", &BaselineConfig::default()).unwrap();
        let mut experimental = summary(&[(10.0, 1.0)]);
        experimental.rows[0].area_sum = None;
        assert!(matches!(
            evaluate_deviations(&model, &experimental, "treated"),
            Err(MorphError::NoDataFound(_))
        ));
    }

    #[test]
    fn test_table_layout() {
        let model = fit_baseline(&control(), "control", &BaselineConfig::default()).unwrap();
        let set = evaluate_deviations(&model, &control(), "control").unwrap();
        let table = set.to_table().unwrap();
        assert_eq!(
            table.columns(),
            &["file_name", "area_sum", "observed", "predicted", "deviation", "extrapolated"]
        );
        assert_eq!(table.n_rows(), 16);
    }
}
