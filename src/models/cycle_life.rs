//! Cycle-life model: cycles to failure as a power law of depth of discharge.
//!
//! N(d) = p0 · d^(-p1)

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::curve::{AxisLabels, CurveModel, FittedCurve, Limits, ParametricCurve};

/// A fitted cycle-life curve.
pub type CycleLifeCurveModel = FittedCurve<CycleLifeCurve>;

/// The cycle-life family. Both axes are clamped to non-negative values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CycleLifeCurve;

impl ParametricCurve for CycleLifeCurve {
    const PARAM_COUNT: usize = 2;

    fn name(&self) -> &'static str {
        "cycle-life"
    }

    fn value(&self, x: f64, params: &Array1<f64>) -> f64 {
        params[0] * x.powf(-params[1])
    }

    fn default_xlim(&self) -> Limits {
        Limits::NON_NEGATIVE
    }

    fn default_ylim(&self) -> Limits {
        Limits::NON_NEGATIVE
    }

    fn axis_labels(&self) -> AxisLabels {
        AxisLabels {
            x: "Depth of discharge",
            y: "Cycles to failure",
        }
    }
}

impl FittedCurve<CycleLifeCurve> {
    /// Whether the positive cycle counts span more than two orders of magnitude,
    /// in which case plots read better on a logarithmic axis.
    pub fn prefers_log_scale(&self) -> bool {
        let (lo, hi) = self
            .raw_y()
            .iter()
            .filter(|&&n| n > 0.0)
            .fold((f64::INFINITY, 0.0_f64), |(lo, hi), &n| (lo.min(n), hi.max(n)));
        lo.is_finite() && hi / lo > 100.0
    }
}
