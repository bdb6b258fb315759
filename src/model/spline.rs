//! Penalized cubic B-spline regression (P-splines).
//!
//! A cubic B-spline basis on equally spaced knots is combined with a
//! second-order difference penalty on adjacent coefficients. The penalty's
//! null space is the straight line, so heavy smoothing degrades gracefully
//! to a linear fit. The smoothing parameter is chosen by generalized
//! cross-validation (GCV).

use crate::error::{MorphError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

const DEGREE: usize = 3;

/// Cubic B-spline basis with equally spaced knots over `[lower, upper]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BSplineBasis {
    lower: f64,
    upper: f64,
    n_basis: usize,
    knots: Vec<f64>,
}

impl BSplineBasis {
    /// Create a basis of `n_basis` functions (at least 4).
    pub fn new(lower: f64, upper: f64, n_basis: usize) -> Result<Self> {
        if n_basis < DEGREE + 1 {
            return Err(MorphError::InvalidParameter(format!(
                "a cubic spline basis needs at least {} functions, got {}",
                DEGREE + 1,
                n_basis
            )));
        }
        if !(lower.is_finite() && upper.is_finite() && upper > lower) {
            return Err(MorphError::InvalidParameter(format!(
                "invalid spline range [{}, {}]",
                lower, upper
            )));
        }
        let step = (upper - lower) / (n_basis - DEGREE) as f64;
        let knots = (0..n_basis + DEGREE + 1)
            .map(|j| lower + (j as f64 - DEGREE as f64) * step)
            .collect();
        Ok(Self {
            lower,
            upper,
            n_basis,
            knots,
        })
    }

    /// Number of basis functions.
    pub fn n_basis(&self) -> usize {
        self.n_basis
    }

    /// Lower end of the fitted range.
    pub fn lower(&self) -> f64 {
        self.lower
    }

    /// Upper end of the fitted range.
    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// Check whether `x` lies in the fitted range.
    pub fn contains(&self, x: f64) -> bool {
        x >= self.lower && x <= self.upper
    }

    /// Knot span containing `x` (clamped to the fitted range).
    fn span(&self, x: f64) -> usize {
        let step = self.knots[DEGREE + 1] - self.knots[DEGREE];
        let offset = ((x - self.lower) / step).floor();
        let last = (self.n_basis - 1 - DEGREE) as f64;
        DEGREE + offset.clamp(0.0, last) as usize
    }

    /// The four non-zero basis values at `x`, for basis indices
    /// `span - 3 ..= span` (de Boor's recurrence).
    fn nonzero(&self, x: f64) -> (usize, [f64; DEGREE + 1]) {
        let x = x.clamp(self.lower, self.upper);
        let span = self.span(x);
        let t = &self.knots;

        let mut n = [0.0; DEGREE + 1];
        let mut left = [0.0; DEGREE + 1];
        let mut right = [0.0; DEGREE + 1];
        n[0] = 1.0;
        for j in 1..=DEGREE {
            left[j] = x - t[span + 1 - j];
            right[j] = t[span + j] - x;
            let mut saved: f64 = 0.0;
            for r in 0..j {
                let temp = n[r] / (right[r + 1] + left[j - r]);
                n[r] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            n[j] = saved;
        }
        (span, n)
    }

    /// All basis values at `x`; `x` is clamped to the fitted range.
    pub fn eval(&self, x: f64) -> Vec<f64> {
        let mut row = vec![0.0; self.n_basis];
        let (span, n) = self.nonzero(x);
        for (i, v) in n.iter().enumerate() {
            row[span - DEGREE + i] = *v;
        }
        row
    }

    /// Design matrix with one row per value of `xs`.
    pub fn design(&self, xs: &[f64]) -> DMatrix<f64> {
        let mut b = DMatrix::zeros(xs.len(), self.n_basis);
        for (r, &x) in xs.iter().enumerate() {
            let (span, n) = self.nonzero(x);
            for (i, v) in n.iter().enumerate() {
                b[(r, span - DEGREE + i)] = *v;
            }
        }
        b
    }
}

/// `D'D` for the second-order difference matrix `D` on `n` coefficients.
pub fn difference_penalty(n: usize) -> DMatrix<f64> {
    let rows = n.saturating_sub(2);
    let mut d = DMatrix::zeros(rows, n);
    for i in 0..rows {
        d[(i, i)] = 1.0;
        d[(i, i + 1)] = -2.0;
        d[(i, i + 2)] = 1.0;
    }
    d.transpose() * d
}

/// Result of a penalized least-squares fit at one smoothing parameter.
#[derive(Debug, Clone)]
pub struct PenalizedFit {
    pub coefficients: DVector<f64>,
    pub lambda: f64,
    /// Effective degrees of freedom (trace of the hat matrix).
    pub edf: f64,
    pub rss: f64,
    pub gcv: f64,
}

/// Solve `(B'B + λP) β = B'y` and score the fit.
pub fn fit_penalized(
    b: &DMatrix<f64>,
    y: &DVector<f64>,
    penalty: &DMatrix<f64>,
    lambda: f64,
) -> Result<PenalizedFit> {
    let n = b.nrows() as f64;
    let btb = b.transpose() * b;
    let bty = b.transpose() * y;
    let system = &btb + penalty * lambda;

    let chol = system.cholesky().ok_or_else(|| {
        MorphError::Numerical(format!(
            "penalized normal equations are not positive definite (lambda = {:e})",
            lambda
        ))
    })?;
    let coefficients = chol.solve(&bty);
    let edf = chol.solve(&btb).trace();

    let residuals = y - b * &coefficients;
    let rss = residuals.norm_squared();
    let denom = n - edf;
    let gcv = if denom > 0.0 {
        n * rss / (denom * denom)
    } else {
        f64::INFINITY
    };

    Ok(PenalizedFit {
        coefficients,
        lambda,
        edf,
        rss,
        gcv,
    })
}

/// Log-spaced smoothing parameters from 1e-6 to 1e6.
pub fn default_lambda_grid() -> Vec<f64> {
    (-60..=60).map(|k| 10f64.powf(k as f64 / 10.0)).collect()
}

/// Fit at every grid value and keep the fit with the lowest GCV score.
pub fn select_lambda(
    b: &DMatrix<f64>,
    y: &DVector<f64>,
    penalty: &DMatrix<f64>,
    grid: &[f64],
) -> Result<PenalizedFit> {
    let mut best: Option<PenalizedFit> = None;
    for &lambda in grid {
        let fit = match fit_penalized(b, y, penalty, lambda) {
            Ok(f) => f,
            Err(e) => {
                tracing::debug!("Skipping smoothing parameter {:e}: {}", lambda, e);
                continue;
            }
        };
        if best.as_ref().map_or(true, |current| fit.gcv < current.gcv) {
            best = Some(fit);
        }
    }
    let best = best.ok_or_else(|| {
        MorphError::Numerical("no smoothing parameter produced a valid fit".to_string())
    })?;
    tracing::debug!(
        "Selected smoothing parameter {:e} (edf {:.2}, GCV {:.4e})",
        best.lambda,
        best.edf,
        best.gcv
    );
    Ok(best)
}
