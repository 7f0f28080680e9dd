//! The curve-model capability and its generic fitted implementation.
//!
//! [`CurveModel`] is what collections store and query: a fitted curve with raw
//! samples, a key, and `evaluate`/`fit`/`rmse`. [`ParametricCurve`] is the
//! smaller contract a curve family implements (parameter count and function);
//! [`FittedCurve`] joins the two, so each family only supplies its formula.

use log::warn;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{CurveError, Result};
use crate::fit::{FitMode, FitOptions, FitReport, Fitter};
use crate::lm::LmConfig;
use crate::problem::{CurveProblem, Problem};
use crate::simplex::SimplexConfig;

/// Optional lower and upper bounds used to clamp a curve's domain or range.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Limits {
    /// Lower bound, if any
    pub min: Option<f64>,
    /// Upper bound, if any
    pub max: Option<f64>,
}

impl Limits {
    /// No bounds.
    pub const UNBOUNDED: Limits = Limits {
        min: None,
        max: None,
    };

    /// Bounded below by zero.
    pub const NON_NEGATIVE: Limits = Limits {
        min: Some(0.0),
        max: None,
    };

    /// Create limits from optional bounds.
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    /// Clamp `value` into the limits. NaN passes through.
    pub fn clamp(&self, value: f64) -> f64 {
        let mut v = value;
        if let Some(min) = self.min {
            if v < min {
                v = min;
            }
        }
        if let Some(max) = self.max {
            if v > max {
                v = max;
            }
        }
        v
    }
}

/// Axis labels offered to plotting consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisLabels {
    /// Label of the independent variable, with units
    pub x: &'static str,
    /// Label of the dependent variable, with units
    pub y: &'static str,
}

/// A parametric curve family: a fixed parameter count and a function of `x`.
pub trait ParametricCurve {
    /// Number of entries in the parameter vector.
    const PARAM_COUNT: usize;

    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Evaluate the family at `x` with the given parameters, without clamping.
    fn value(&self, x: f64, params: &Array1<f64>) -> f64;

    /// Default clamp for the independent variable.
    fn default_xlim(&self) -> Limits {
        Limits::UNBOUNDED
    }

    /// Default clamp for the dependent variable.
    fn default_ylim(&self) -> Limits {
        Limits::UNBOUNDED
    }

    /// Axis labels for plotting.
    fn axis_labels(&self) -> AxisLabels;
}

/// The capability shared by every curve stored in a collection.
pub trait CurveModel {
    /// Key of this curve within a collection (current, depth of discharge, ...).
    fn key(&self) -> f64;

    /// Independent-variable samples.
    fn raw_x(&self) -> &Array1<f64>;

    /// Dependent-variable samples.
    fn raw_y(&self) -> &Array1<f64>;

    /// Current parameter vector.
    fn params(&self) -> &Array1<f64>;

    /// Fit strategy in use.
    fn mode(&self) -> FitMode;

    /// Evaluate the fitted curve at `x`. Pure; never mutates the model.
    fn evaluate(&self, x: f64) -> f64;

    /// Refit the parameters to the raw samples using the current mode.
    fn fit(&mut self) -> Result<FitReport>;

    /// Switch strategy and refit from the current parameters.
    ///
    /// On error the previous mode and parameters are kept.
    fn set_mode(&mut self, mode: FitMode) -> Result<FitReport>;

    /// Root-mean-square residual of the current parameters against the samples.
    fn rmse(&self) -> f64;

    /// Evaluate the fitted curve at every point of `x`.
    fn evaluate_many(&self, x: &Array1<f64>) -> Array1<f64> {
        x.mapv(|v| self.evaluate(v))
    }

    /// Check structural invariants, e.g. after deserialization.
    ///
    /// The default accepts everything. Implementors that hold raw samples or
    /// parameters must override it: [`CurveCollection::from_json`] relies on
    /// it to reject corrupt curves.
    ///
    /// [`CurveCollection::from_json`]: crate::CurveCollection::from_json
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// A curve of family `C` fitted to raw samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedCurve<C> {
    curve: C,
    raw_x: Array1<f64>,
    raw_y: Array1<f64>,
    z: f64,
    x0: Array1<f64>,
    params: Array1<f64>,
    mode: FitMode,
    xlim: Limits,
    ylim: Limits,
    lm: LmConfig,
    simplex: SimplexConfig,
    last_fit: Option<FitReport>,
}

impl<C: ParametricCurve> FittedCurve<C> {
    /// Build an unfitted curve; parameters start at the seed `options.x0`.
    ///
    /// # Errors
    ///
    /// * `DimensionMismatch` if the sample vectors differ in length, are empty,
    ///   or `x0` does not have `C::PARAM_COUNT` entries
    /// * `InvalidInput` if the key or any sample is not finite
    pub fn new(
        curve: C,
        raw_x: impl Into<Array1<f64>>,
        raw_y: impl Into<Array1<f64>>,
        z: f64,
        options: FitOptions,
    ) -> Result<Self> {
        let raw_x = raw_x.into();
        let raw_y = raw_y.into();
        let x0 = options.seed(C::PARAM_COUNT)?;

        let xlim = curve.default_xlim();
        let ylim = curve.default_ylim();
        let model = Self {
            curve,
            raw_x,
            raw_y,
            z,
            params: x0.clone(),
            x0,
            mode: options.mode,
            xlim,
            ylim,
            lm: options.lm,
            simplex: options.simplex,
            last_fit: None,
        };
        model.check_invariants()?;
        Ok(model)
    }

    /// Build a curve and fit it immediately.
    pub fn fitted(
        curve: C,
        raw_x: impl Into<Array1<f64>>,
        raw_y: impl Into<Array1<f64>>,
        z: f64,
        options: FitOptions,
    ) -> Result<Self> {
        let mut model = Self::new(curve, raw_x, raw_y, z, options)?;
        model.fit()?;
        Ok(model)
    }

    /// Replace the domain clamp.
    pub fn with_xlim(mut self, xlim: Limits) -> Self {
        self.xlim = xlim;
        self
    }

    /// Replace the range clamp.
    pub fn with_ylim(mut self, ylim: Limits) -> Self {
        self.ylim = ylim;
        self
    }

    /// The curve family.
    pub fn curve(&self) -> &C {
        &self.curve
    }

    /// The seed the model was constructed with.
    pub fn x0(&self) -> &Array1<f64> {
        &self.x0
    }

    /// Domain clamp.
    pub fn xlim(&self) -> Limits {
        self.xlim
    }

    /// Range clamp.
    pub fn ylim(&self) -> Limits {
        self.ylim
    }

    /// Report of the most recent successful fit.
    pub fn last_fit(&self) -> Option<&FitReport> {
        self.last_fit.as_ref()
    }

    /// Axis labels for plotting.
    pub fn axis_labels(&self) -> AxisLabels {
        self.curve.axis_labels()
    }

    /// `n` evenly spaced samples of the fitted curve over the raw `x` range.
    pub fn sampled(&self, n: usize) -> (Array1<f64>, Array1<f64>) {
        let lo = self.raw_x.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = self.raw_x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let xs = Array1::linspace(lo, hi, n);
        let ys = self.evaluate_many(&xs);
        (xs, ys)
    }

    fn check_invariants(&self) -> Result<()> {
        if self.raw_x.is_empty() || self.raw_x.len() != self.raw_y.len() {
            return Err(CurveError::DimensionMismatch(format!(
                "raw_x has {} samples and raw_y has {}; both need the same non-zero length",
                self.raw_x.len(),
                self.raw_y.len()
            )));
        }
        if self.params.len() != C::PARAM_COUNT || self.x0.len() != C::PARAM_COUNT {
            return Err(CurveError::DimensionMismatch(format!(
                "{} curves take {} parameters, got {}",
                self.curve.name(),
                C::PARAM_COUNT,
                self.params.len()
            )));
        }
        if !self.z.is_finite() {
            return Err(CurveError::InvalidInput(format!(
                "curve key must be finite, got {}",
                self.z
            )));
        }
        if self
            .raw_x
            .iter()
            .chain(self.raw_y.iter())
            .any(|v| !v.is_finite())
        {
            return Err(CurveError::InvalidInput(
                "raw samples must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

impl<C: ParametricCurve> CurveModel for FittedCurve<C> {
    fn key(&self) -> f64 {
        self.z
    }

    fn raw_x(&self) -> &Array1<f64> {
        &self.raw_x
    }

    fn raw_y(&self) -> &Array1<f64> {
        &self.raw_y
    }

    fn params(&self) -> &Array1<f64> {
        &self.params
    }

    fn mode(&self) -> FitMode {
        self.mode
    }

    fn evaluate(&self, x: f64) -> f64 {
        let x = self.xlim.clamp(x);
        self.ylim.clamp(self.curve.value(x, &self.params))
    }

    /// Seeds from the current parameters, which equal `x0` until the first fit.
    fn fit(&mut self) -> Result<FitReport> {
        let problem = CurveProblem::new(&self.curve, &self.raw_x, &self.raw_y)?;
        let fitter = Fitter::from_options(&FitOptions {
            x0: None,
            mode: self.mode,
            lm: self.lm.clone(),
            simplex: self.simplex.clone(),
        });
        let report = fitter.fit(&problem, self.params.clone(), self.mode)?;

        if !report.converged {
            warn!(
                "{} curve at key {} did not converge ({}); keeping best parameters, rmse = {:.3e}",
                self.curve.name(),
                self.z,
                report.message,
                report.rmse
            );
        }

        self.params = report.params.clone();
        self.last_fit = Some(report.clone());
        Ok(report)
    }

    fn set_mode(&mut self, mode: FitMode) -> Result<FitReport> {
        let previous = self.mode;
        self.mode = mode;
        self.fit().map_err(|e| {
            self.mode = previous;
            e
        })
    }

    fn rmse(&self) -> f64 {
        let problem = match CurveProblem::new(&self.curve, &self.raw_x, &self.raw_y) {
            Ok(problem) => problem,
            Err(_) => return f64::INFINITY,
        };
        match problem.eval_cost(&self.params) {
            Ok(cost) => (cost / self.raw_x.len().max(1) as f64).sqrt(),
            Err(_) => f64::INFINITY,
        }
    }

    fn validate(&self) -> Result<()> {
        self.check_invariants()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// y = a * x + b
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Line;

    impl ParametricCurve for Line {
        const PARAM_COUNT: usize = 2;

        fn name(&self) -> &'static str {
            "line"
        }

        fn value(&self, x: f64, params: &Array1<f64>) -> f64 {
            params[0] * x + params[1]
        }

        fn axis_labels(&self) -> AxisLabels {
            AxisLabels { x: "x", y: "y" }
        }
    }

    fn line_samples() -> (Vec<f64>, Vec<f64>) {
        let x = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        let y = x.iter().map(|x| 2.0 * x - 1.0).collect();
        (x, y)
    }

    #[test]
    fn test_construction_validates_samples() {
        let err = FittedCurve::new(Line, vec![1.0, 2.0], vec![1.0], 0.0, FitOptions::new());
        assert!(matches!(err, Err(CurveError::DimensionMismatch(_))));

        let err = FittedCurve::new(Line, Vec::new(), Vec::new(), 0.0, FitOptions::new());
        assert!(matches!(err, Err(CurveError::DimensionMismatch(_))));

        let err = FittedCurve::new(
            Line,
            vec![1.0],
            vec![1.0],
            0.0,
            FitOptions::new().with_x0(vec![1.0, 2.0, 3.0]),
        );
        assert!(matches!(err, Err(CurveError::DimensionMismatch(_))));

        let err = FittedCurve::new(Line, vec![1.0], vec![f64::NAN], 0.0, FitOptions::new());
        assert!(matches!(err, Err(CurveError::InvalidInput(_))));
    }

    #[test]
    fn test_invalid_mode_aborts_construction() {
        let err = FitOptions::new().with_mode_str("gradient");
        assert!(matches!(err, Err(CurveError::InvalidMode(_))));
    }

    #[test]
    fn test_default_seed_is_zero() {
        let (x, y) = line_samples();
        let model = FittedCurve::new(Line, x, y, 1.0, FitOptions::new()).unwrap();
        assert_eq!(model.params(), &array![0.0, 0.0]);
        assert_eq!(model.mode(), FitMode::Both);
        assert!(model.last_fit().is_none());
    }

    #[test]
    fn test_fit_and_evaluate() {
        let (x, y) = line_samples();
        let model = FittedCurve::fitted(
            Line,
            x,
            y,
            1.0,
            FitOptions::new().with_mode(FitMode::Lsq),
        )
        .unwrap();

        assert_relative_eq!(model.evaluate(2.5), 4.0, epsilon = 1e-6);
        assert!(model.rmse() < 1e-6);
        assert_relative_eq!(model.rmse(), model.last_fit().unwrap().rmse, epsilon = 1e-9);
    }

    #[test]
    fn test_evaluate_is_clamped() {
        let (x, y) = line_samples();
        let model = FittedCurve::new(Line, x, y, 1.0, FitOptions::new().with_x0(vec![2.0, -1.0]))
            .unwrap()
            .with_xlim(Limits::new(Some(0.0), Some(4.0)))
            .with_ylim(Limits::NON_NEGATIVE);

        assert_relative_eq!(model.evaluate(10.0), 7.0);
        assert_relative_eq!(model.evaluate(-3.0), 0.0);
        assert_relative_eq!(model.evaluate(0.25), 0.0);
    }

    #[test]
    fn test_set_mode_refits_from_current_params() {
        let (x, y) = line_samples();
        let mut model = FittedCurve::fitted(
            Line,
            x,
            y,
            1.0,
            FitOptions::new().with_mode(FitMode::Lsq).with_x0(vec![5.0, 5.0]),
        )
        .unwrap();
        let fitted = model.params().clone();

        let report = model.set_mode(FitMode::Simplex).unwrap();
        assert_eq!(model.mode(), FitMode::Simplex);
        assert_eq!(report.mode, FitMode::Simplex);
        // Seeded at the optimum, the simplex stays there rather than
        // wandering back from x0
        assert_relative_eq!(model.params()[0], fitted[0], epsilon = 1e-6);
        assert_relative_eq!(model.params()[1], fitted[1], epsilon = 1e-6);
        assert_eq!(model.x0(), &array![5.0, 5.0]);
    }

    #[test]
    fn test_sampled_spans_raw_range() {
        let (x, y) = line_samples();
        let model = FittedCurve::new(Line, x, y, 1.0, FitOptions::new().with_x0(vec![2.0, -1.0]))
            .unwrap();
        let (xs, ys) = model.sampled(9);
        assert_eq!(xs.len(), 9);
        assert_relative_eq!(xs[0], 0.0);
        assert_relative_eq!(xs[8], 4.0);
        assert_relative_eq!(ys[8], 7.0);
    }
}
