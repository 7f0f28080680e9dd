//! Problem definition trait and the curve-fitting adapter.
//!
//! This module defines the `Problem` trait, which represents a nonlinear
//! least squares problem to be solved by either optimizer in this crate,
//! and `CurveProblem`, which turns a parametric curve plus raw samples into one.

use ndarray::{Array1, Array2};

use crate::curve::ParametricCurve;
use crate::error::{CurveError, Result};

/// A trait representing a nonlinear least squares problem.
///
/// Both the Levenberg-Marquardt and the Nelder-Mead optimizers consume this
/// trait; the former uses residuals and the Jacobian, the latter only the cost.
pub trait Problem {
    /// Evaluate the residuals at the given parameters.
    ///
    /// # Arguments
    ///
    /// * `params` - The parameter values at which to evaluate the residuals
    ///
    /// # Returns
    ///
    /// * A vector of residuals, or an error if the evaluation fails
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Get the number of parameters in the problem.
    fn parameter_count(&self) -> usize;

    /// Get the number of residuals in the problem.
    fn residual_count(&self) -> usize;

    /// Evaluate the Jacobian matrix at the given parameters.
    ///
    /// The default implementation uses forward finite differences.
    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>>
    where
        Self: Sized,
    {
        crate::utils::finite_difference::jacobian(self, params, None)
    }

    /// Evaluate the sum of squared residuals at the given parameters.
    ///
    /// Non-finite residuals make the cost `+inf`, so optimizers can rank such
    /// points as worse than any finite one.
    fn eval_cost(&self, params: &Array1<f64>) -> Result<f64> {
        let residuals = self.eval(params)?;
        Ok(sum_of_squares(&residuals))
    }
}

/// Sum of squared residuals, with NaN folded into `+inf`.
pub(crate) fn sum_of_squares(residuals: &Array1<f64>) -> f64 {
    let cost: f64 = residuals.iter().map(|r| r.powi(2)).sum();
    if cost.is_nan() {
        f64::INFINITY
    } else {
        cost
    }
}

/// Least-squares problem for one parametric curve against its raw samples.
///
/// Residuals are `f(x_i; p) - y_i`, evaluated without the curve's domain
/// clamps so the optimizers see the unclamped function.
pub struct CurveProblem<'a, C: ParametricCurve> {
    curve: &'a C,
    x_data: &'a Array1<f64>,
    y_data: &'a Array1<f64>,
}

impl<'a, C: ParametricCurve> CurveProblem<'a, C> {
    /// Create a new problem over the given samples.
    pub fn new(curve: &'a C, x_data: &'a Array1<f64>, y_data: &'a Array1<f64>) -> Result<Self> {
        if x_data.len() != y_data.len() {
            return Err(CurveError::DimensionMismatch(format!(
                "Expected x and y data to have the same length, got {} and {}",
                x_data.len(),
                y_data.len()
            )));
        }
        Ok(Self {
            curve,
            x_data,
            y_data,
        })
    }
}

impl<'a, C: ParametricCurve> Problem for CurveProblem<'a, C> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        if params.len() != C::PARAM_COUNT {
            return Err(CurveError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                C::PARAM_COUNT,
                params.len()
            )));
        }

        let residuals = self
            .x_data
            .iter()
            .zip(self.y_data.iter())
            .map(|(&x, &y)| self.curve.value(x, params) - y)
            .collect::<Vec<f64>>();

        Ok(Array1::from_vec(residuals))
    }

    fn parameter_count(&self) -> usize {
        C::PARAM_COUNT
    }

    fn residual_count(&self) -> usize {
        self.x_data.len()
    }
}
