//! Fit-method selection and sequencing.
//!
//! A fit runs one of three strategies against a [`Problem`]:
//!
//! - [`FitMode::Lsq`]: a single Levenberg-Marquardt pass
//! - [`FitMode::Simplex`]: a single Nelder-Mead pass (selector `"fmin"`)
//! - [`FitMode::Both`]: Levenberg-Marquardt, then Nelder-Mead seeded with its
//!   result. The simplex result is only taken when it is no worse, so the
//!   combined fit never ends above the LSQ-only cost.

use log::debug;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CurveError, Result};
use crate::lm::{LevenbergMarquardt, LmConfig};
use crate::problem::Problem;
use crate::simplex::{NelderMead, SimplexConfig};

/// Optimization strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FitMode {
    /// Gradient-based least squares (Levenberg-Marquardt).
    #[serde(rename = "lsq")]
    Lsq,
    /// Derivative-free downhill simplex (Nelder-Mead).
    #[serde(rename = "fmin", alias = "simplex")]
    Simplex,
    /// Least squares refined by the simplex.
    #[default]
    #[serde(rename = "both")]
    Both,
}

impl FitMode {
    /// The selector string for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            FitMode::Lsq => "lsq",
            FitMode::Simplex => "fmin",
            FitMode::Both => "both",
        }
    }
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FitMode {
    type Err = CurveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lsq" => Ok(FitMode::Lsq),
            "fmin" | "simplex" => Ok(FitMode::Simplex),
            "both" => Ok(FitMode::Both),
            _ => Err(CurveError::InvalidMode(format!(
                "'{}' (expected one of 'lsq', 'fmin', 'both')",
                s
            ))),
        }
    }
}

/// Options accepted when constructing or fitting a curve.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// Seed parameters; zeros of the family's parameter count when absent.
    pub x0: Option<Vec<f64>>,

    /// Optimization strategy.
    pub mode: FitMode,

    /// Levenberg-Marquardt settings.
    pub lm: LmConfig,

    /// Nelder-Mead settings.
    pub simplex: SimplexConfig,
}

impl FitOptions {
    /// Default options: zero seed, `both` mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the seed parameters.
    pub fn with_x0(mut self, x0: impl Into<Vec<f64>>) -> Self {
        self.x0 = Some(x0.into());
        self
    }

    /// Set the fit mode.
    pub fn with_mode(mut self, mode: FitMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the fit mode from its selector string (`lsq`, `fmin`, `both`).
    pub fn with_mode_str(self, mode: &str) -> Result<Self> {
        Ok(self.with_mode(mode.parse()?))
    }

    /// Replace the Levenberg-Marquardt settings.
    pub fn with_lm_config(mut self, config: LmConfig) -> Self {
        self.lm = config;
        self
    }

    /// Replace the Nelder-Mead settings.
    pub fn with_simplex_config(mut self, config: SimplexConfig) -> Self {
        self.simplex = config;
        self
    }

    /// Resolve the seed vector for a family with `n_params` parameters.
    pub fn seed(&self, n_params: usize) -> Result<Array1<f64>> {
        match &self.x0 {
            None => Ok(Array1::zeros(n_params)),
            Some(x0) if x0.len() == n_params => Ok(Array1::from_vec(x0.clone())),
            Some(x0) => Err(CurveError::DimensionMismatch(format!(
                "x0 has {} values, the curve has {} parameters",
                x0.len(),
                n_params
            ))),
        }
    }
}

/// Outcome of one fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    /// Strategy that produced this report.
    pub mode: FitMode,

    /// Best parameters found.
    pub params: Array1<f64>,

    /// Sum of squared residuals at `params`.
    pub cost: f64,

    /// Root-mean-square residual at `params`.
    pub rmse: f64,

    /// Whether the final stage met its convergence criterion.
    pub converged: bool,

    /// Iterations across all stages.
    pub iterations: usize,

    /// Function evaluations across all stages.
    pub func_evals: usize,

    /// Stage messages.
    pub message: String,
}

impl FitReport {
    /// The `NonConvergence` error describing this fit, if it did not converge.
    ///
    /// Non-convergence is recovered by keeping the best parameters; this is for
    /// callers that prefer to surface it anyway.
    pub fn non_convergence(&self) -> Option<CurveError> {
        if self.converged {
            None
        } else {
            Some(CurveError::NonConvergence(format!(
                "{} fit stopped with rmse {:.3e}: {}",
                self.mode, self.rmse, self.message
            )))
        }
    }
}

impl fmt::Display for FitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fit Report ({}):", self.mode)?;
        writeln!(f, "  Converged: {}", self.converged)?;
        writeln!(f, "  RMSE: {:.6e}", self.rmse)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// Runs the configured optimizers in the order a [`FitMode`] asks for.
#[derive(Debug, Clone, Default)]
pub struct Fitter {
    lm: LevenbergMarquardt,
    simplex: NelderMead,
}

impl Fitter {
    /// Create a fitter with default optimizer settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fitter from the optimizer settings in `options`.
    pub fn from_options(options: &FitOptions) -> Self {
        Self {
            lm: LevenbergMarquardt::with_config(options.lm.clone()),
            simplex: NelderMead::with_config(options.simplex.clone()),
        }
    }

    /// Fit `problem` from `seed` using `mode`.
    ///
    /// Returns `NonConvergence` only when no finite cost was reached; every
    /// other outcome is an `Ok` report, converged or not.
    pub fn fit<P: Problem>(&self, problem: &P, seed: Array1<f64>, mode: FitMode) -> Result<FitReport> {
        let n_residuals = problem.residual_count().max(1) as f64;

        let (params, cost, converged, iterations, func_evals, message) = match mode {
            FitMode::Lsq => {
                let result = self.lm.minimize(problem, seed)?;
                (
                    result.params,
                    result.cost,
                    result.success,
                    result.iterations,
                    result.func_evals,
                    format!("lsq: {}", result.message),
                )
            }
            FitMode::Simplex => {
                let result = self.simplex.minimize(problem, seed)?;
                (
                    result.params,
                    result.cost,
                    result.success,
                    result.iterations,
                    result.func_evals,
                    format!("fmin: {}", result.message),
                )
            }
            FitMode::Both => {
                let lsq = self.lm.minimize(problem, seed)?;
                let refined = self.simplex.minimize(problem, lsq.params.clone())?;
                let iterations = lsq.iterations + refined.iterations;
                let func_evals = lsq.func_evals + refined.func_evals;
                let message = format!("lsq: {}; fmin: {}", lsq.message, refined.message);

                if refined.cost <= lsq.cost {
                    (
                        refined.params,
                        refined.cost,
                        refined.success,
                        iterations,
                        func_evals,
                        message,
                    )
                } else {
                    (
                        lsq.params,
                        lsq.cost,
                        lsq.success,
                        iterations,
                        func_evals,
                        message,
                    )
                }
            }
        };

        if !cost.is_finite() {
            return Err(CurveError::NonConvergence(format!(
                "{} fit found no parameters with a finite cost ({})",
                mode, message
            )));
        }

        let rmse = (cost / n_residuals).sqrt();
        debug!(
            "{} fit finished: rmse = {:.3e}, converged = {}, iterations = {}",
            mode, rmse, converged, iterations
        );

        Ok(FitReport {
            mode,
            params,
            cost,
            rmse,
            converged,
            iterations,
            func_evals,
            message,
        })
    }
}
