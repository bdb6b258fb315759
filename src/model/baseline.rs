//! Baseline scaling model: mean droplet diameter as a smooth function of
//! log total droplet area, fitted on control specimens.

use crate::data::schema::{AREA_SUM, FERET_DIAMETER, FILE_NAME};
use crate::data::{SummaryTable, Table, Value};
use crate::error::{MorphError, Result};
use crate::model::spline::{default_lambda_grid, difference_penalty, select_lambda, BSplineBasis};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Distinct `ln(area_sum)` values needed to place a cubic basis.
pub const MIN_DISTINCT_AREAS: usize = 4;

/// Settings for fitting the baseline model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Upper bound on the number of spline basis functions.
    pub basis_size: usize,
    /// Fewest usable control specimens accepted.
    pub min_specimens: usize,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            basis_size: 10,
            min_specimens: 10,
        }
    }
}

/// One specimen's summary values as used by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPoint {
    pub file_name: String,
    pub area_sum: f64,
    /// Mean Feret diameter of the specimen's droplets.
    pub feret_diameter: f64,
}

impl ModelPoint {
    /// Natural log of the total area.
    pub fn log_area(&self) -> f64 {
        self.area_sum.ln()
    }
}

/// Split a summary into usable points and the names of unusable specimens.
///
/// A specimen is usable when it has a positive, finite `area_sum` and a
/// finite mean Feret diameter.
pub(crate) fn usable_points(summary: &SummaryTable, cohort: &str) -> Result<(Vec<ModelPoint>, Vec<String>)> {
    let ferets = summary.means_of(FERET_DIAMETER).ok_or_else(|| {
        MorphError::schema(
            cohort,
            format!("summary has no '{}_mean' column", FERET_DIAMETER),
        )
    })?;

    let mut points = Vec::with_capacity(summary.len());
    let mut skipped = Vec::new();
    for (row, feret) in summary.rows.iter().zip(ferets) {
        match (row.area_sum, feret) {
            (Some(area), Some(d)) if area > 0.0 && area.is_finite() && d.is_finite() => {
                points.push(ModelPoint {
                    file_name: row.file_name.clone(),
                    area_sum: area,
                    feret_diameter: d,
                });
            }
            _ => {
                tracing::warn!(
                    "Cohort '{}': specimen '{}' has no usable area sum or diameter, skipped",
                    cohort,
                    row.file_name
                );
                skipped.push(row.file_name.clone());
            }
        }
    }
    Ok((points, skipped))
}

/// A fitted baseline model. Immutable once fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineModel {
    /// Cohort the model was fitted on.
    pub cohort: String,
    basis: BSplineBasis,
    coefficients: Vec<f64>,
    /// Selected smoothing parameter.
    pub lambda: f64,
    /// Effective degrees of freedom of the smooth.
    pub edf: f64,
    /// GCV score at the selected smoothing parameter.
    pub gcv: f64,
    points: Vec<ModelPoint>,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    /// Specimens left out of the fit.
    pub skipped: Vec<String>,
}

impl BaselineModel {
    fn eval_inside(&self, log_area: f64) -> f64 {
        self.basis
            .eval(log_area)
            .iter()
            .zip(&self.coefficients)
            .map(|(b, c)| b * c)
            .sum()
    }

    /// Expected Feret diameter at `ln(area_sum) = log_area`.
    ///
    /// Outside the fitted range the curve continues as a straight line with
    /// the boundary value and slope. Such predictions are unsupported by the
    /// control data and carry no uncertainty guarantee.
    pub fn predict_log(&self, log_area: f64) -> f64 {
        let (lo, hi) = self.log_range();
        if log_area >= lo && log_area <= hi {
            return self.eval_inside(log_area);
        }
        let delta = (hi - lo) * 1e-4;
        if log_area < lo {
            let slope = (self.eval_inside(lo + delta) - self.eval_inside(lo)) / delta;
            self.eval_inside(lo) + slope * (log_area - lo)
        } else {
            let slope = (self.eval_inside(hi) - self.eval_inside(hi - delta)) / delta;
            self.eval_inside(hi) + slope * (log_area - hi)
        }
    }

    /// Expected Feret diameter for a total area; `None` for non-positive or
    /// non-finite areas.
    pub fn predict(&self, area_sum: f64) -> Option<f64> {
        (area_sum > 0.0 && area_sum.is_finite()).then(|| self.predict_log(area_sum.ln()))
    }

    /// Whether predicting at `area_sum` extrapolates beyond the control data.
    pub fn is_extrapolation(&self, area_sum: f64) -> bool {
        !self.basis.contains(area_sum.ln())
    }

    /// Range of `ln(area_sum)` covered by the control specimens.
    pub fn log_range(&self) -> (f64, f64) {
        (self.basis.lower(), self.basis.upper())
    }

    /// Number of specimens the model was fitted on.
    pub fn n_specimens(&self) -> usize {
        self.points.len()
    }

    /// Number of spline basis functions.
    pub fn n_basis(&self) -> usize {
        self.basis.n_basis()
    }

    /// Specimens the model was fitted on.
    pub fn points(&self) -> &[ModelPoint] {
        &self.points
    }

    /// In-sample fitted values.
    pub fn fitted(&self) -> &[f64] {
        &self.fitted
    }

    /// In-sample residuals (`observed − fitted`).
    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    /// Proportion of diameter variance explained by the fit.
    pub fn r_squared(&self) -> f64 {
        let n = self.points.len() as f64;
        let mean = self.points.iter().map(|p| p.feret_diameter).sum::<f64>() / n;
        let tss: f64 = self.points.iter().map(|p| (p.feret_diameter - mean).powi(2)).sum();
        let rss: f64 = self.residuals.iter().map(|r| r * r).sum();
        if tss > 0.0 {
            1.0 - rss / tss
        } else {
            0.0
        }
    }

    /// Per-specimen fit as a table.
    pub fn fit_table(&self) -> Result<Table> {
        let columns = [FILE_NAME, AREA_SUM, "log_area_sum", "observed", "fitted", "residual"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let rows = self
            .points
            .iter()
            .zip(self.fitted.iter().zip(&self.residuals))
            .map(|(p, (f, r))| {
                vec![
                    Value::Text(p.file_name.clone()),
                    Value::Number(p.area_sum),
                    Value::Number(p.log_area()),
                    Value::Number(p.feret_diameter),
                    Value::Number(*f),
                    Value::Number(*r),
                ]
            })
            .collect();
        Table::with_rows(columns, rows)
    }

    /// Write the per-specimen fit.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.fit_table()?.to_csv(path)
    }
}

/// Fit `feret_diameter_mean ~ s(ln(area_sum))` on a control summary.
///
/// The natural log of `area_sum` is the predictor; the smooth is a P-spline
/// whose smoothing parameter minimizes GCV.
///
/// # Errors
/// `InsufficientData` when fewer than `min_specimens` specimens are usable or
/// fewer than four distinct areas remain.
pub fn fit_baseline(summary: &SummaryTable, cohort: &str, config: &BaselineConfig) -> Result<BaselineModel> {
    if config.basis_size < MIN_DISTINCT_AREAS {
        return Err(MorphError::InvalidParameter(format!(
            "basis_size must be at least {}, got {}",
            MIN_DISTINCT_AREAS, config.basis_size
        )));
    }

    let (points, skipped) = usable_points(summary, cohort)?;
    if points.len() < config.min_specimens {
        return Err(MorphError::InsufficientData {
            cohort: cohort.to_string(),
            found: points.len(),
            required: config.min_specimens,
        });
    }

    let xs: Vec<f64> = points.iter().map(ModelPoint::log_area).collect();
    let mut distinct = xs.clone();
    distinct.sort_by(|a, b| a.total_cmp(b));
    distinct.dedup();
    if distinct.len() < MIN_DISTINCT_AREAS {
        return Err(MorphError::InsufficientData {
            cohort: cohort.to_string(),
            found: distinct.len(),
            required: MIN_DISTINCT_AREAS,
        });
    }

    let n_basis = config.basis_size.min(distinct.len());
    let basis = BSplineBasis::new(distinct[0], distinct[distinct.len() - 1], n_basis)?;
    let b = basis.design(&xs);
    let y = DVector::from_iterator(points.len(), points.iter().map(|p| p.feret_diameter));
    let fit = select_lambda(&b, &y, &difference_penalty(n_basis), &default_lambda_grid())
        .map_err(|e| MorphError::Numerical(format!("cohort '{}': {}", cohort, e)))?;

    let mut model = BaselineModel {
        cohort: cohort.to_string(),
        basis,
        coefficients: fit.coefficients.iter().copied().collect(),
        lambda: fit.lambda,
        edf: fit.edf,
        gcv: fit.gcv,
        points,
        fitted: Vec::new(),
        residuals: Vec::new(),
        skipped,
    };
    model.fitted = model.points.iter().map(|p| model.predict_log(p.log_area())).collect();
    model.residuals = model
        .points
        .iter()
        .zip(&model.fitted)
        .map(|(p, f)| p.feret_diameter - f)
        .collect();

    tracing::info!(
        "Fitted baseline on cohort '{}': {} specimens, edf {:.2}, lambda {:.3e}, R² {:.3}",
        cohort,
        model.n_specimens(),
        model.edf,
        model.lambda,
        model.r_squared()
    );
    Ok(model)
}
