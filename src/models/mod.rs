//! Built-in curve families for battery data.
//!
//! - [`DischargeCurve`]: terminal voltage against depleted capacity at a fixed current
//! - [`CycleLifeCurve`]: cycles to failure against depth of discharge

mod cycle_life;
mod discharge;

pub use cycle_life::{CycleLifeCurve, CycleLifeCurveModel};
pub use discharge::{DischargeCurve, DischargeCurveModel};
