//! # battfit
//!
//! `battfit` fits parametric curves to battery measurement data and
//! interpolates across families of fitted curves.
//!
//! The library provides:
//! - A three-segment discharge-voltage model and a power-law cycle-life model
//! - Fitting by Levenberg-Marquardt (`lsq`), Nelder-Mead (`fmin`), or both
//! - Sorted curve collections that blend neighbouring curves with a cubic spline
//! - A discharge curve set answering voltage(current, capacity) queries
//!
//! ## Basic Usage
//!
//! ```no_run
//! use battfit::{DischargeCurveSet, FitOptions, REFERENCE_TEMPERATURE};
//!
//! # fn main() -> battfit::Result<()> {
//! let capacity = vec![0.0, 0.5, 1.0, 1.5, 2.0];
//! let mut set: DischargeCurveSet = DischargeCurveSet::new();
//! for (current, voltage) in [
//!     (1.0, vec![3.80, 3.62, 3.55, 3.47, 3.20]),
//!     (5.0, vec![3.74, 3.57, 3.49, 3.40, 3.05]),
//!     (10.0, vec![3.66, 3.49, 3.41, 3.30, 2.90]),
//! ] {
//!     let options = FitOptions::new()
//!         .with_x0(vec![0.2, 5.0, 3.5, 1.0, 0.98, 0.45, 0.05, 8.0, 2.0]);
//!     set.discharge_fit(voltage, capacity.clone(), current, REFERENCE_TEMPERATURE, options)?;
//! }
//! let v = set.interp(7.5, 1.2)?;
//! # let _ = v;
//! # Ok(())
//! # }
//! ```

pub mod collection;
pub mod constants;
pub mod curve;
pub mod discharge_set;
pub mod error;
pub mod fit;
pub mod lm;
pub mod models;
pub mod problem;
pub mod simplex;
pub mod spline;

mod utils;

// Re-exports for convenience
pub use collection::{CurveCollection, DEFAULT_MIN_FUNS};
pub use constants::REFERENCE_TEMPERATURE;
pub use curve::{AxisLabels, CurveModel, FittedCurve, Limits, ParametricCurve};
pub use discharge_set::DischargeCurveSet;
pub use error::{CurveError, Result};
pub use fit::{FitMode, FitOptions, FitReport, Fitter};
pub use lm::{LevenbergMarquardt, LmConfig};
pub use models::{CycleLifeCurve, CycleLifeCurveModel, DischargeCurve, DischargeCurveModel};
pub use problem::Problem;
pub use simplex::{NelderMead, SimplexConfig};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
