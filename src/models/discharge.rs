//! Three-segment discharge-voltage model.
//!
//! Voltage as a function of depleted capacity `C` is the sum of
//!
//! - an activation term, dominant at low capacity: `p0·exp(-p1·C) + p2`
//! - a Nernst open-circuit term, dominant mid-range:
//!   `p3·Vt·ln(s / (1 - s))` with `s = p4 - p5·C` and `Vt = R·T/F`
//! - a collapse term near full depletion: `-p6·exp(p7·(C - p8))`

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::constants::{thermal_voltage, REFERENCE_TEMPERATURE};
use crate::curve::{AxisLabels, CurveModel, FittedCurve, Limits, ParametricCurve};
use crate::error::{CurveError, Result};
use crate::fit::FitOptions;

/// Keeps the Nernst logarithm finite at and beyond the ends of the charge window.
const SOC_EPSILON: f64 = 1e-9;

/// A discharge curve fitted at one current.
pub type DischargeCurveModel = FittedCurve<DischargeCurve>;

/// The discharge-voltage family at a fixed cell temperature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DischargeCurve {
    temperature: f64,
}

impl Default for DischargeCurve {
    fn default() -> Self {
        Self {
            temperature: REFERENCE_TEMPERATURE,
        }
    }
}

impl DischargeCurve {
    /// Create the family for a cell at `temperature` kelvin.
    pub fn new(temperature: f64) -> Result<Self> {
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(CurveError::InvalidInput(format!(
                "temperature must be a positive number of kelvin, got {}",
                temperature
            )));
        }
        Ok(Self { temperature })
    }

    /// Cell temperature in kelvin.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// The three additive terms `[activation, nernst, collapse]` at `c`.
    pub fn segments(&self, c: f64, p: &Array1<f64>) -> [f64; 3] {
        let activation = p[0] * (-p[1] * c).exp() + p[2];

        let s = (p[4] - p[5] * c).clamp(SOC_EPSILON, 1.0 - SOC_EPSILON);
        let nernst = p[3] * thermal_voltage(self.temperature) * (s / (1.0 - s)).ln();

        let collapse = -p[6] * (p[7] * (c - p[8])).exp();

        [activation, nernst, collapse]
    }
}

impl ParametricCurve for DischargeCurve {
    const PARAM_COUNT: usize = 9;

    fn name(&self) -> &'static str {
        "discharge"
    }

    fn value(&self, x: f64, params: &Array1<f64>) -> f64 {
        self.segments(x, params).iter().sum()
    }

    fn default_xlim(&self) -> Limits {
        Limits::NON_NEGATIVE
    }

    fn default_ylim(&self) -> Limits {
        Limits::NON_NEGATIVE
    }

    fn axis_labels(&self) -> AxisLabels {
        AxisLabels {
            x: "Depleted capacity (Ah)",
            y: "Voltage (V)",
        }
    }
}

impl FittedCurve<DischargeCurve> {
    /// Build an unfitted discharge curve keyed by the magnitude of `current`.
    ///
    /// Samples are given voltage first, as they are usually tabulated.
    pub fn discharge(
        voltage: impl Into<Array1<f64>>,
        capacity: impl Into<Array1<f64>>,
        current: f64,
        temperature: f64,
        options: FitOptions,
    ) -> Result<Self> {
        FittedCurve::new(
            DischargeCurve::new(temperature)?,
            capacity,
            voltage,
            current.abs(),
            options,
        )
    }

    /// The absolute current this curve was measured at.
    pub fn current(&self) -> f64 {
        self.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::FitMode;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn true_params() -> Array1<f64> {
        array![0.3, 5.0, 3.5, 1.0, 0.98, 0.45, 0.05, 8.0, 2.0]
    }

    #[test]
    fn test_segments_dominate_their_regions() {
        let curve = DischargeCurve::default();
        let p = true_params();

        let [act_start, _, col_start] = curve.segments(0.0, &p);
        let [act_end, _, col_end] = curve.segments(2.1, &p);

        // Activation overshoot fades, collapse grows
        assert!(act_start - p[2] > 0.29);
        assert!(act_end - p[2] < 1e-4);
        assert!(col_start.abs() < 1e-6);
        assert!(col_end < -0.1);
    }

    #[test]
    fn test_voltage_is_finite_everywhere() {
        let curve = DischargeCurve::default();
        let p = true_params();
        for c in [0.0, 0.5, 2.17, 5.0, 100.0] {
            assert!(!curve.value(c, &p).is_nan());
        }
        // Zero seed evaluates to zero rather than NaN
        assert_eq!(curve.value(1.0, &Array1::zeros(9)), 0.0);
    }

    #[test]
    fn test_temperature_scales_nernst_term() {
        let p = true_params();
        let cold = DischargeCurve::new(273.15).unwrap();
        let hot = DischargeCurve::new(323.15).unwrap();
        let ratio = hot.segments(1.5, &p)[1] / cold.segments(1.5, &p)[1];
        assert_relative_eq!(ratio, 323.15 / 273.15, epsilon = 1e-12);

        assert!(DischargeCurve::new(-5.0).is_err());
    }

    #[test]
    fn test_key_is_absolute_current() {
        let model = DischargeCurveModel::discharge(
            vec![3.9, 3.5],
            vec![0.0, 1.0],
            -2.5,
            REFERENCE_TEMPERATURE,
            FitOptions::new(),
        )
        .unwrap();
        assert_eq!(model.key(), 2.5);
        assert_eq!(model.current(), 2.5);
        assert_eq!(model.raw_x(), &array![0.0, 1.0]);
        assert_eq!(model.raw_y(), &array![3.9, 3.5]);
    }

    #[test]
    fn test_lsq_round_trip_from_true_params() {
        let curve = DischargeCurve::default();
        let p = true_params();
        let capacity = Array1::linspace(0.0, 2.1, 40);
        let voltage = capacity.mapv(|c| curve.value(c, &p));

        let model = DischargeCurveModel::fitted(
            curve,
            capacity.clone(),
            voltage.clone(),
            1.0,
            FitOptions::new()
                .with_mode(FitMode::Lsq)
                .with_x0(p.to_vec()),
        )
        .unwrap();

        assert!(model.rmse() <= 1e-6);
        for (c, v) in capacity.iter().zip(voltage.iter()) {
            assert_relative_eq!(model.evaluate(*c), *v, epsilon = 1e-6);
        }
    }
}
