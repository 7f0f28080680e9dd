//! Levenberg-Marquardt algorithm implementation.
//!
//! This is the gradient-based (`lsq`) strategy used by curve fits. It
//! minimizes the sum of squared residuals of any [`Problem`](crate::Problem)
//! and never fails just because the iteration budget ran out: the best
//! parameters found are returned with `success == false`.

pub mod algorithm;
pub mod config;

pub use algorithm::{LevenbergMarquardt, LmResult};
pub use config::LmConfig;
