//! Natural cubic spline used to blend curves across the key axis.

use crate::error::{CurveError, Result};

/// A natural cubic spline interpolator for real-valued data.
///
/// Given n knots (x_i, y_i), builds piecewise cubics with continuous first and
/// second derivatives and zero curvature at both ends. Two knots give a line.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    /// Strictly increasing knots.
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at each knot.
    y2s: Vec<f64>,
}

impl CubicSpline {
    /// Construct a natural cubic spline from data points.
    ///
    /// # Errors
    ///
    /// * `DimensionMismatch` if `xs` and `ys` differ in length
    /// * `InvalidInput` if there are fewer than two knots or `xs` is not
    ///   strictly increasing
    /// * `FunctionEvaluation` if any `ys` value is not finite
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self> {
        if xs.len() != ys.len() {
            return Err(CurveError::DimensionMismatch(format!(
                "spline has {} knots but {} values",
                xs.len(),
                ys.len()
            )));
        }
        if xs.len() < 2 {
            return Err(CurveError::InvalidInput(
                "a spline needs at least 2 knots".to_string(),
            ));
        }
        if xs.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(CurveError::InvalidInput(
                "spline knots must be strictly increasing".to_string(),
            ));
        }
        if let Some(bad) = ys.iter().position(|y| !y.is_finite()) {
            return Err(CurveError::FunctionEvaluation(format!(
                "value {} at knot {} is not finite",
                ys[bad], xs[bad]
            )));
        }

        let n = xs.len();
        let mut y2s = vec![0.0; n];
        let mut u = vec![0.0; n - 1];

        // Forward sweep of the tridiagonal system
        for i in 1..n - 1 {
            let sig = (xs[i] - xs[i - 1]) / (xs[i + 1] - xs[i - 1]);
            let p = sig * y2s[i - 1] + 2.0;
            y2s[i] = (sig - 1.0) / p;
            u[i] = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i])
                - (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1]);
            u[i] = (6.0 * u[i] / (xs[i + 1] - xs[i - 1]) - sig * u[i - 1]) / p;
        }

        // Back substitution
        for k in (0..n - 2).rev() {
            y2s[k + 1] = y2s[k + 1] * y2s[k + 2] + u[k + 1];
        }

        Ok(Self { xs, ys, y2s })
    }

    /// Evaluate the spline at `x`. Outside the knots the end cubic is extended.
    pub fn evaluate(&self, x: f64) -> f64 {
        // Enclosing interval [lo, lo + 1]
        let hi = self
            .xs
            .partition_point(|&k| k <= x)
            .clamp(1, self.xs.len() - 1);
        let lo = hi - 1;

        let h = self.xs[hi] - self.xs[lo];
        let a = (self.xs[hi] - x) / h;
        let b = (x - self.xs[lo]) / h;

        a * self.ys[lo]
            + b * self.ys[hi]
            + ((a * a * a - a) * self.y2s[lo] + (b * b * b - b) * self.y2s[hi]) * h * h / 6.0
    }
}
