//! Utility functions shared by the optimizers.

pub mod finite_difference;
pub mod matrix_convert;
