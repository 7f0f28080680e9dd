//! Conversions from ndarray (the public currency of this crate) to faer
//! (used for the dense products inside the Levenberg-Marquardt loop).

use crate::error::Result;
use faer::{Col, Mat};
use ndarray::{Array1, Array2};

/// Convert an ndarray Array2 to a faer Mat.
pub fn ndarray_to_faer(arr: &Array2<f64>) -> Result<Mat<f64>> {
    // ndarray is row-major by default, faer is column-major
    Ok(Mat::from_fn(arr.nrows(), arr.ncols(), |i, j| arr[[i, j]]))
}

/// Convert an ndarray Array1 to a faer Col (column vector).
pub fn ndarray_vec_to_faer(arr: &Array1<f64>) -> Result<Col<f64>> {
    Ok(Col::from_fn(arr.len(), |i| arr[i]))
}
