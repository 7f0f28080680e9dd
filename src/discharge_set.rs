//! Discharge curves at several currents, queried as voltage(current, capacity).
//!
//! A [`DischargeCurveSet`] wraps a [`CurveCollection`] keyed by absolute
//! current. It keeps the current range `[i_min, i_max]` in step with every
//! insertion and removal, clamps queries into it, and memoizes the most
//! recent query.

use log::trace;
use ndarray::Array1;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::Cell;

use crate::collection::{CurveCollection, Iter};
use crate::curve::CurveModel;
use crate::error::{CurveError, Result};
use crate::fit::{FitOptions, FitReport};
use crate::models::DischargeCurveModel;

/// The single memoized query.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CachedQuery {
    current: f64,
    capacity: f64,
    voltage: f64,
}

/// Discharge curves keyed by absolute current.
///
/// Not `Sync`: the query cache is a `Cell`, so sharing a set across threads
/// needs external locking.
#[derive(Debug, Clone)]
pub struct DischargeCurveSet<M = DischargeCurveModel> {
    curves: CurveCollection<M>,
    i_min: Option<f64>,
    i_max: Option<f64>,
    cache: Cell<Option<CachedQuery>>,
}

impl<M: CurveModel> Default for DischargeCurveSet<M> {
    fn default() -> Self {
        Self {
            curves: CurveCollection::new(),
            i_min: None,
            i_max: None,
            cache: Cell::new(None),
        }
    }
}

/// Currents are stored as magnitudes.
fn check_current_key<M: CurveModel>(model: &M) -> Result<()> {
    let key = model.key();
    if key < 0.0 {
        return Err(CurveError::InvalidInput(format!(
            "discharge curves are keyed by absolute current, got {}",
            key
        )));
    }
    Ok(())
}

impl<M: CurveModel> DischargeCurveSet<M> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set from any number of curves; later curves win on equal currents.
    ///
    /// # Errors
    ///
    /// * `InvalidInput` if any curve has a negative key
    pub fn from_models<I: IntoIterator<Item = M>>(models: I) -> Result<Self> {
        Self::from_collection(CurveCollection::from_models(models))
    }

    /// Wrap an existing collection.
    ///
    /// # Errors
    ///
    /// * `InvalidInput` if any curve has a negative key
    pub fn from_collection(curves: CurveCollection<M>) -> Result<Self> {
        for (_, model) in curves.iter() {
            check_current_key(model)?;
        }
        let mut set = Self {
            curves,
            ..Self::default()
        };
        set.refresh();
        Ok(set)
    }

    /// Set the number of curves required before blending across currents.
    pub fn with_min_funs(mut self, min_funs: usize) -> Self {
        self.curves = self.curves.with_min_funs(min_funs);
        self.cache.set(None);
        self
    }

    fn refresh(&mut self) {
        self.i_min = self.curves.min_key();
        self.i_max = self.curves.max_key();
        self.cache.set(None);
    }

    /// Insert a curve, returning the one it replaced at the same current.
    ///
    /// # Errors
    ///
    /// * `InvalidInput` if the curve's key is negative; the set is unchanged
    pub fn add(&mut self, model: M) -> Result<Option<M>> {
        check_current_key(&model)?;
        let replaced = self.curves.add(model);
        self.refresh();
        Ok(replaced)
    }

    /// Remove the curve measured at `current` (sign ignored).
    ///
    /// # Errors
    ///
    /// * `KeyNotFound` if no curve was measured at that current
    pub fn remove(&mut self, current: f64) -> Result<M> {
        let removed = self.curves.remove(current.abs())?;
        self.refresh();
        Ok(removed)
    }

    /// Smallest stored current.
    pub fn i_min(&self) -> Option<f64> {
        self.i_min
    }

    /// Largest stored current.
    pub fn i_max(&self) -> Option<f64> {
        self.i_max
    }

    /// The underlying collection.
    pub fn curves(&self) -> &CurveCollection<M> {
        &self.curves
    }

    /// The curve measured at `current` (sign ignored).
    pub fn get(&self, current: f64) -> Option<&M> {
        self.curves.get(current.abs())
    }

    /// `(current, curve)` pairs in ascending current order.
    pub fn iter(&self) -> Iter<'_, M> {
        self.curves.iter()
    }

    /// Number of stored curves.
    pub fn len(&self) -> usize {
        self.curves.len()
    }

    /// Whether no curves are stored.
    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    /// Terminal voltage at `current` after `capacity` has been drawn.
    ///
    /// The current's sign is ignored and its magnitude clamped into
    /// `[i_min, i_max]`. Repeating the previous call's exact arguments returns
    /// the memoized voltage without evaluating any curve.
    ///
    /// # Errors
    ///
    /// Same as [`CurveCollection::interp`]. Failed queries are not cached.
    pub fn interp(&self, current: f64, capacity: f64) -> Result<f64> {
        if let Some(cached) = self.cache.get() {
            if cached.current == current && cached.capacity == capacity {
                trace!("discharge query cache hit at I = {}, C = {}", current, capacity);
                return Ok(cached.voltage);
            }
        }

        let (lo, hi) = match (self.i_min, self.i_max) {
            (Some(lo), Some(hi)) => (lo, hi),
            _ => {
                return Err(CurveError::KeyNotFound(
                    "cannot query an empty discharge curve set".to_string(),
                ))
            }
        };

        let voltage = self.curves.interp(current.abs().clamp(lo, hi), capacity)?;
        self.cache.set(Some(CachedQuery {
            current,
            capacity,
            voltage,
        }));
        Ok(voltage)
    }
}

impl<M: CurveModel + Serialize> DischargeCurveSet<M> {
    /// Serialize the stored curves to JSON.
    pub fn to_json(&self) -> Result<String> {
        self.curves.to_json()
    }
}

impl<M: CurveModel + DeserializeOwned> DischargeCurveSet<M> {
    /// Load a set from JSON written by [`to_json`](Self::to_json).
    ///
    /// # Errors
    ///
    /// * `JsonError` for malformed input
    /// * `InvalidInput` if a stored curve has a negative key
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_collection(CurveCollection::from_json(json)?)
    }
}

impl DischargeCurveSet<DischargeCurveModel> {
    /// Fit a discharge curve to one measurement run and insert it.
    ///
    /// Builds a [`DischargeCurveModel`] keyed by `|current|`, fits it with
    /// `options` (seed `x0`, mode `lsq`/`fmin`/`both`, default `both`), and
    /// replaces any curve already stored at that current.
    ///
    /// # Errors
    ///
    /// Construction errors (`DimensionMismatch`, `InvalidInput`) and
    /// `NonConvergence` when no finite fit exists. Nothing is inserted on error.
    pub fn discharge_fit(
        &mut self,
        voltage: impl Into<Array1<f64>>,
        capacity: impl Into<Array1<f64>>,
        current: f64,
        temperature: f64,
        options: FitOptions,
    ) -> Result<FitReport> {
        let mut model =
            DischargeCurveModel::discharge(voltage, capacity, current, temperature, options)?;
        let report = model.fit()?;
        self.add(model)?;
        Ok(report)
    }
}
