//! Observation sequences with explicit per-dimension missingness.

use ndarray::{Array2, ArrayView1};

use crate::error::SsmError;

/// An ordered sequence of `T` observation vectors of width `m`.
///
/// Each scalar is either present or missing; the presence mask is stored
/// next to the values and the filter branches on it directly. Missing
/// cells hold `0.0` in the value array and are never read.
#[derive(Clone, Debug, PartialEq)]
pub struct Observations {
    values: Array2<f64>,
    present: Array2<bool>,
}

impl Observations {
    /// Builds observations from a `T × m` value array and a matching
    /// presence mask.
    ///
    /// # Errors
    ///
    /// Returns [`SsmError::Configuration`] if the shapes differ, the width
    /// is zero, or a present value is not finite.
    pub fn new(values: Array2<f64>, present: Array2<bool>) -> Result<Self, SsmError> {
        if values.dim() != present.dim() {
            return Err(SsmError::config(format!(
                "observation values {:?} and presence mask {:?} differ in shape",
                values.dim(),
                present.dim()
            )));
        }
        if values.ncols() == 0 {
            return Err(SsmError::config("observations have zero width"));
        }
        let mut values = values;
        for ((t, d), v) in values.indexed_iter_mut() {
            if present[[t, d]] {
                if !v.is_finite() {
                    return Err(SsmError::config(format!(
                        "non-finite observation at step {t}, dimension {d}"
                    )));
                }
            } else {
                *v = 0.0;
            }
        }
        Ok(Self { values, present })
    }

    /// Builds fully observed data from a `T × m` array.
    pub fn fully_observed(values: Array2<f64>) -> Result<Self, SsmError> {
        let present = Array2::from_elem(values.dim(), true);
        Self::new(values, present)
    }

    /// Builds observations treating `NaN` cells as missing.
    ///
    /// # Errors
    ///
    /// Returns [`SsmError::Configuration`] for infinite values or zero width.
    pub fn from_nan_masked(values: Array2<f64>) -> Result<Self, SsmError> {
        let present = values.mapv(|v| !v.is_nan());
        Self::new(values, present)
    }

    /// Builds observations from rows of optional values.
    ///
    /// # Errors
    ///
    /// Returns [`SsmError::Configuration`] if rows differ in width, there
    /// are no columns, or a value is not finite.
    pub fn from_rows(rows: &[Vec<Option<f64>>]) -> Result<Self, SsmError> {
        let width = rows.first().map_or(0, Vec::len);
        if let Some((t, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(SsmError::config(format!(
                "row {t} has {} values, expected {width}",
                row.len()
            )));
        }
        let values = Array2::from_shape_fn((rows.len(), width), |(t, d)| {
            rows[t][d].unwrap_or(0.0)
        });
        let present = Array2::from_shape_fn((rows.len(), width), |(t, d)| rows[t][d].is_some());
        Self::new(values, present)
    }

    /// Marks one cell as missing.
    ///
    /// # Panics
    ///
    /// Panics if `(t, dim)` is out of bounds.
    pub fn mark_missing(&mut self, t: usize, dim: usize) {
        self.present[[t, dim]] = false;
        self.values[[t, dim]] = 0.0;
    }

    /// Number of time steps `T`.
    pub fn n_steps(&self) -> usize {
        self.values.nrows()
    }

    /// Observation width `m`.
    pub fn n_dims(&self) -> usize {
        self.values.ncols()
    }

    /// Value at `(t, dim)`, or `None` if missing.
    pub fn value(&self, t: usize, dim: usize) -> Option<f64> {
        self.present[[t, dim]].then(|| self.values[[t, dim]])
    }

    /// Whether `(t, dim)` is present.
    pub fn is_present(&self, t: usize, dim: usize) -> bool {
        self.present[[t, dim]]
    }

    /// Raw row `t`; missing cells read as `0.0`.
    pub fn row(&self, t: usize) -> ArrayView1<'_, f64> {
        self.values.row(t)
    }

    /// Indices of the present dimensions at step `t`, ascending.
    pub fn present_dims(&self, t: usize) -> Vec<usize> {
        self.present
            .row(t)
            .iter()
            .enumerate()
            .filter_map(|(d, &p)| p.then_some(d))
            .collect()
    }

    /// Total number of present cells.
    pub fn n_present(&self) -> usize {
        self.present.iter().filter(|&&p| p).count()
    }
}
