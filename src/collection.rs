//! Sorted collection of fitted curves with cross-curve interpolation.
//!
//! Curves are kept in ascending key order with at most one curve per key.
//! [`CurveCollection::interp`] answers `y(z, x)` queries for keys between the
//! stored curves by evaluating every curve at `x` and fitting a natural cubic
//! spline through the results along the key axis.

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::iter::FusedIterator;

use crate::curve::CurveModel;
use crate::error::{CurveError, Result};
use crate::spline::CubicSpline;

/// Minimum number of curves needed to blend across keys, unless configured.
pub const DEFAULT_MIN_FUNS: usize = 3;

/// Total order on keys that treats `-0.0` and `0.0` as equal.
fn cmp_keys(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
}

/// Curves sorted by key. Adding at an existing key replaces the stored curve.
#[derive(Debug, Clone, Serialize)]
pub struct CurveCollection<M> {
    entries: Vec<M>,
    min_funs: usize,
}

#[derive(Deserialize)]
struct CollectionRepr<M> {
    entries: Vec<M>,
    min_funs: usize,
}

impl<M: CurveModel> Default for CurveCollection<M> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            min_funs: DEFAULT_MIN_FUNS,
        }
    }
}

impl<M: CurveModel> CurveCollection<M> {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection from any number of curves.
    ///
    /// Later curves replace earlier ones with the same key.
    pub fn from_models<I: IntoIterator<Item = M>>(models: I) -> Self {
        let mut collection = Self::new();
        collection.extend(models);
        collection
    }

    /// Set the number of curves required before blending across keys.
    pub fn with_min_funs(mut self, min_funs: usize) -> Self {
        self.min_funs = min_funs;
        self
    }

    /// Number of curves required before blending across keys.
    pub fn min_funs(&self) -> usize {
        self.min_funs
    }

    fn position(&self, z: f64) -> std::result::Result<usize, usize> {
        self.entries
            .binary_search_by(|model| cmp_keys(model.key(), z))
    }

    /// Insert `model`, returning the curve it replaced, if any.
    ///
    /// Keys are expected to be finite; [`FittedCurve`](crate::FittedCurve)
    /// guarantees this at construction.
    pub fn add(&mut self, model: M) -> Option<M> {
        match self.position(model.key()) {
            Ok(i) => Some(std::mem::replace(&mut self.entries[i], model)),
            Err(i) => {
                self.entries.insert(i, model);
                None
            }
        }
    }

    /// Remove and return the curve stored at exactly `z`.
    ///
    /// # Errors
    ///
    /// * `KeyNotFound` if no curve has that key
    pub fn remove(&mut self, z: f64) -> Result<M> {
        match self.position(z) {
            Ok(i) => Ok(self.entries.remove(i)),
            Err(_) => Err(CurveError::KeyNotFound(format!(
                "no curve stored at key {}",
                z
            ))),
        }
    }

    /// The curve stored at exactly `z`.
    pub fn get(&self, z: f64) -> Option<&M> {
        self.position(z).ok().map(|i| &self.entries[i])
    }

    /// Whether a curve is stored at exactly `z`.
    pub fn contains_key(&self, z: f64) -> bool {
        self.position(z).is_ok()
    }

    /// Number of stored curves.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no curves are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Smallest stored key.
    pub fn min_key(&self) -> Option<f64> {
        self.entries.first().map(|m| m.key())
    }

    /// Largest stored key.
    pub fn max_key(&self) -> Option<f64> {
        self.entries.last().map(|m| m.key())
    }

    /// Stored keys in ascending order.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = f64> + '_ {
        self.entries.iter().map(|m| m.key())
    }

    /// `(key, curve)` pairs in ascending key order.
    ///
    /// Each call starts a fresh traversal; the collection cannot be mutated
    /// while one is alive.
    pub fn iter(&self) -> Iter<'_, M> {
        Iter {
            inner: self.entries.iter(),
        }
    }

    /// Clamp `z` into the stored key range.
    ///
    /// # Errors
    ///
    /// * `KeyNotFound` if the collection is empty
    /// * `InvalidInput` if `z` is NaN
    pub fn clamp_key(&self, z: f64) -> Result<f64> {
        let (lo, hi) = match (self.min_key(), self.max_key()) {
            (Some(lo), Some(hi)) => (lo, hi),
            _ => {
                return Err(CurveError::KeyNotFound(
                    "cannot query an empty curve collection".to_string(),
                ))
            }
        };
        if z.is_nan() {
            return Err(CurveError::InvalidInput("query key is NaN".to_string()));
        }
        Ok(z.clamp(lo, hi))
    }

    /// Interpolate `y` at key `z` and abscissa `x`.
    ///
    /// `z` is clamped into the stored key range. A key that matches a stored
    /// curve returns that curve's value alone; any other key blends all
    /// curves with a natural cubic spline along the key axis.
    ///
    /// # Errors
    ///
    /// * `KeyNotFound` if the collection is empty
    /// * `InsufficientCurves` if blending is needed and fewer than
    ///   [`min_funs`](Self::min_funs) curves are stored
    /// * `FunctionEvaluation` if a curve evaluates to a non-finite value at `x`
    pub fn interp(&self, z: f64, x: f64) -> Result<f64> {
        let z = self.clamp_key(z)?;

        if let Ok(i) = self.position(z) {
            let y = self.entries[i].evaluate(x);
            if !y.is_finite() {
                return Err(CurveError::FunctionEvaluation(format!(
                    "curve at key {} evaluates to {} at x = {}",
                    z, y, x
                )));
            }
            return Ok(y);
        }

        if self.entries.len() < self.min_funs {
            return Err(CurveError::InsufficientCurves {
                needed: self.min_funs,
                found: self.entries.len(),
            });
        }

        let keys: Vec<f64> = self.keys().collect();
        let values: Vec<f64> = self.entries.iter().map(|m| m.evaluate(x)).collect();
        let spline = CubicSpline::new(keys, values)?;
        let y = spline.evaluate(z);

        debug!(
            "blended {} curves at z = {}, x = {}: y = {}",
            self.entries.len(),
            z,
            x,
            y
        );
        Ok(y)
    }
}

impl<M: CurveModel + Serialize> CurveCollection<M> {
    /// Serialize the collection to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl<M: CurveModel + DeserializeOwned> CurveCollection<M> {
    /// Load a collection from JSON, validating every curve and restoring
    /// key order and uniqueness.
    pub fn from_json(json: &str) -> Result<Self> {
        let repr: CollectionRepr<M> = serde_json::from_str(json)?;
        for model in &repr.entries {
            model.validate()?;
        }
        Ok(Self::from_models(repr.entries).with_min_funs(repr.min_funs))
    }
}

impl<M: CurveModel> FromIterator<M> for CurveCollection<M> {
    fn from_iter<I: IntoIterator<Item = M>>(iter: I) -> Self {
        Self::from_models(iter)
    }
}

impl<M: CurveModel> Extend<M> for CurveCollection<M> {
    fn extend<I: IntoIterator<Item = M>>(&mut self, iter: I) {
        for model in iter {
            self.add(model);
        }
    }
}

impl<'a, M: CurveModel> IntoIterator for &'a CurveCollection<M> {
    type Item = (f64, &'a M);
    type IntoIter = Iter<'a, M>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ascending `(key, curve)` iterator over a [`CurveCollection`].
#[derive(Debug, Clone)]
pub struct Iter<'a, M> {
    inner: std::slice::Iter<'a, M>,
}

impl<'a, M: CurveModel> Iterator for Iter<'a, M> {
    type Item = (f64, &'a M);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|m| (m.key(), m))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, M: CurveModel> DoubleEndedIterator for Iter<'a, M> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|m| (m.key(), m))
    }
}

impl<'a, M: CurveModel> ExactSizeIterator for Iter<'a, M> {}

impl<'a, M: CurveModel> FusedIterator for Iter<'a, M> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::{FitMode, FitReport};
    use approx::assert_relative_eq;
    use ndarray::{array, Array1};

    /// y = slope * x at key z
    #[derive(Debug, Clone, PartialEq)]
    struct Ramp {
        z: f64,
        slope: f64,
        x: Array1<f64>,
        params: Array1<f64>,
    }

    impl Ramp {
        fn new(z: f64, slope: f64) -> Self {
            Self {
                z,
                slope,
                x: array![0.0, 1.0],
                params: array![slope],
            }
        }
    }

    impl CurveModel for Ramp {
        fn key(&self) -> f64 {
            self.z
        }

        fn raw_x(&self) -> &Array1<f64> {
            &self.x
        }

        fn raw_y(&self) -> &Array1<f64> {
            &self.x
        }

        fn params(&self) -> &Array1<f64> {
            &self.params
        }

        fn mode(&self) -> FitMode {
            FitMode::Lsq
        }

        fn evaluate(&self, x: f64) -> f64 {
            self.slope * x
        }

        fn fit(&mut self) -> Result<FitReport> {
            Err(CurveError::NonConvergence("ramps are not fitted".to_string()))
        }

        fn set_mode(&mut self, _mode: FitMode) -> Result<FitReport> {
            self.fit()
        }

        fn rmse(&self) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_add_keeps_order_and_replaces() {
        let mut curves = CurveCollection::new();
        assert!(curves.add(Ramp::new(20.0, 2.0)).is_none());
        assert!(curves.add(Ramp::new(5.0, 0.5)).is_none());
        assert!(curves.add(Ramp::new(10.0, 1.0)).is_none());

        let replaced = curves.add(Ramp::new(10.0, 1.5)).unwrap();
        assert_eq!(replaced.slope, 1.0);

        assert_eq!(curves.len(), 3);
        assert_eq!(curves.keys().collect::<Vec<_>>(), vec![5.0, 10.0, 20.0]);
        assert_eq!(curves.get(10.0).unwrap().slope, 1.5);
    }

    #[test]
    fn test_negative_zero_matches_zero() {
        let curves = CurveCollection::from_models([Ramp::new(0.0, 1.0), Ramp::new(1.0, 2.0)]);
        assert!(curves.contains_key(-0.0));
    }

    #[test]
    fn test_remove_missing_key() {
        let mut curves = CurveCollection::from_models([Ramp::new(5.0, 1.0)]);
        assert!(matches!(curves.remove(6.0), Err(CurveError::KeyNotFound(_))));
        assert_eq!(curves.remove(5.0).unwrap().slope, 1.0);
        assert!(curves.is_empty());
    }

    #[test]
    fn test_empty_query_fails() {
        let curves: CurveCollection<Ramp> = CurveCollection::new();
        assert!(matches!(curves.interp(1.0, 1.0), Err(CurveError::KeyNotFound(_))));
    }

    #[test]
    fn test_nan_query_fails() {
        let curves = CurveCollection::from_models([Ramp::new(5.0, 1.0)]);
        assert!(matches!(
            curves.interp(f64::NAN, 1.0),
            Err(CurveError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_non_finite_value_fails_on_every_path() {
        let curves = CurveCollection::from_models([
            Ramp::new(5.0, 1.0),
            Ramp::new(10.0, 2.0),
            Ramp::new(20.0, 4.0),
        ]);

        for z in [10.0, 7.5, 50.0] {
            assert!(matches!(
                curves.interp(z, f64::NAN),
                Err(CurveError::FunctionEvaluation(_))
            ));
            assert!(matches!(
                curves.interp(z, f64::INFINITY),
                Err(CurveError::FunctionEvaluation(_))
            ));
        }
    }

    #[test]
    fn test_blend_needs_min_funs() {
        let curves = CurveCollection::from_models([Ramp::new(5.0, 1.0), Ramp::new(20.0, 4.0)]);

        // Exact and clamped queries never blend
        assert_relative_eq!(curves.interp(5.0, 2.0).unwrap(), 2.0);
        assert_relative_eq!(curves.interp(50.0, 2.0).unwrap(), 8.0);

        match curves.interp(10.0, 2.0) {
            Err(CurveError::InsufficientCurves { needed, found }) => {
                assert_eq!(needed, 3);
                assert_eq!(found, 2);
            }
            other => panic!("Expected InsufficientCurves, got {:?}", other),
        }

        // With the threshold lowered, two curves blend linearly
        let curves = curves.with_min_funs(2);
        assert_relative_eq!(curves.interp(10.0, 2.0).unwrap(), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_blend_follows_linear_trend_in_key() {
        // slope = 0.1 * z, so y(z, x) = 0.1 * z * x exactly
        let curves: CurveCollection<Ramp> = [5.0, 10.0, 20.0, 40.0]
            .iter()
            .map(|&z| Ramp::new(z, 0.1 * z))
            .collect();

        assert_relative_eq!(curves.interp(15.0, 3.0).unwrap(), 4.5, epsilon = 1e-12);
        assert_relative_eq!(curves.interp(32.5, 2.0).unwrap(), 6.5, epsilon = 1e-12);
    }

    #[test]
    fn test_iter_is_restartable_and_double_ended() {
        let curves = CurveCollection::from_models([
            Ramp::new(3.0, 1.0),
            Ramp::new(1.0, 1.0),
            Ramp::new(2.0, 1.0),
        ]);

        let first: Vec<f64> = curves.iter().map(|(z, _)| z).collect();
        let second: Vec<f64> = (&curves).into_iter().map(|(z, _)| z).collect();
        assert_eq!(first, vec![1.0, 2.0, 3.0]);
        assert_eq!(first, second);
        assert_eq!(curves.iter().rev().next().unwrap().0, 3.0);
        assert_eq!(curves.iter().len(), 3);
    }
}
