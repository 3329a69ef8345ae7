//! Dated yield panel with per-cell missingness.

use chrono::NaiveDate;
use tracing::debug;
use yieldkf_ssm::{Observations, StateSpaceModel};

use crate::error::CurveError;
use crate::maturity::parse_maturity;

/// Yields at several maturities over a strictly increasing sequence of
/// dates.
///
/// Each cell is `Some(yield)` or `None` when the series was not quoted on
/// that date.
#[derive(Clone, Debug, PartialEq)]
pub struct YieldPanel {
    dates: Vec<NaiveDate>,
    labels: Vec<String>,
    maturities: Vec<f64>,
    rows: Vec<Vec<Option<f64>>>,
}

impl YieldPanel {
    /// Builds a panel from column labels and one row per date.
    ///
    /// # Errors
    ///
    /// | Variant | Trigger |
    /// |---------|---------|
    /// | [`CurveError::ColumnMismatch`] | no columns |
    /// | [`CurveError::InvalidMaturityLabel`] | a label is not a maturity |
    /// | [`CurveError::DateCountMismatch`] | `dates.len() != rows.len()` |
    /// | [`CurveError::RowWidthMismatch`] | a row has the wrong width |
    /// | [`CurveError::NonFiniteCell`] | a present cell is NaN or infinite |
    /// | [`CurveError::UnsortedDates`] | dates not strictly increasing |
    pub fn new(
        dates: Vec<NaiveDate>,
        labels: Vec<String>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> Result<Self, CurveError> {
        if labels.is_empty() {
            return Err(CurveError::ColumnMismatch {
                reason: "panel has no maturity columns".to_string(),
            });
        }
        let maturities = labels
            .iter()
            .map(|l| parse_maturity(l))
            .collect::<Result<Vec<_>, _>>()?;
        if dates.len() != rows.len() {
            return Err(CurveError::DateCountMismatch {
                dates: dates.len(),
                rows: rows.len(),
            });
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != labels.len() {
                return Err(CurveError::RowWidthMismatch {
                    row: i,
                    expected: labels.len(),
                    got: row.len(),
                });
            }
            if let Some(col) = row.iter().position(|v| v.is_some_and(|x| !x.is_finite())) {
                return Err(CurveError::NonFiniteCell {
                    row: i,
                    column: labels[col].clone(),
                });
            }
        }
        check_increasing(&dates)?;
        Ok(Self {
            dates,
            labels,
            maturities,
            rows,
        })
    }

    /// Observation dates.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Column labels, e.g. `"3 MO"`.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Column maturities in years.
    pub fn maturities(&self) -> &[f64] {
        &self.maturities
    }

    /// Rows of optional yields, one per date.
    pub fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.rows
    }

    /// Number of dates.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Returns `true` if the panel has no rows.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Number of maturity columns.
    pub fn n_columns(&self) -> usize {
        self.labels.len()
    }

    /// Most recent date, if any.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Converts the panel into observations with an explicit presence mask.
    ///
    /// # Errors
    ///
    /// Returns [`CurveError::EmptyPanel`] if there are no rows.
    pub fn observations(&self) -> Result<Observations, CurveError> {
        if self.is_empty() {
            return Err(CurveError::EmptyPanel);
        }
        Ok(Observations::from_rows(&self.rows)?)
    }

    /// Polynomial-loading model over this panel's maturities.
    pub fn model(&self, n_factors: usize) -> Result<StateSpaceModel, CurveError> {
        Ok(StateSpaceModel::from_maturities(&self.maturities, n_factors)?)
    }

    /// Merges the rows of `newer` dated strictly after [`last_date`](Self::last_date).
    ///
    /// Returns the number of rows appended. Rows of `newer` on or before
    /// the last stored date are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CurveError::ColumnMismatch`] if the labels differ.
    pub fn append(&mut self, newer: YieldPanel) -> Result<usize, CurveError> {
        if newer.labels != self.labels {
            return Err(CurveError::ColumnMismatch {
                reason: format!(
                    "stored columns {:?} differ from new columns {:?}",
                    self.labels, newer.labels
                ),
            });
        }
        let cutoff = self.last_date();
        let before = self.len();
        for (date, row) in newer.dates.into_iter().zip(newer.rows) {
            if cutoff.is_none_or(|last| date > last) {
                self.dates.push(date);
                self.rows.push(row);
            }
        }
        let appended = self.len() - before;
        debug!(appended, total = self.len(), "yield panel appended");
        Ok(appended)
    }
}

fn check_increasing(dates: &[NaiveDate]) -> Result<(), CurveError> {
    match dates.windows(2).find(|w| w[1] <= w[0]) {
        Some(w) => Err(CurveError::UnsortedDates {
            previous: w[0],
            current: w[1],
        }),
        None => Ok(()),
    }
}
