//! Dated tables of latent factor estimates.

use chrono::NaiveDate;
use ndarray::{Array2, ArrayView1};
use yieldkf_ssm::FACTOR_NAMES;

use crate::error::CurveError;

/// Column names for `n` factors: `level`, `slope`, `convexity`, then
/// `factor3`, `factor4`, ...
pub fn factor_names(n: usize) -> Vec<String> {
    (0..n)
        .map(|j| match FACTOR_NAMES.get(j) {
            Some(name) => (*name).to_string(),
            None => format!("factor{j}"),
        })
        .collect()
}

/// Factor means by date, e.g. the filtered or smoothed output of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct FactorTable {
    dates: Vec<NaiveDate>,
    names: Vec<String>,
    values: Array2<f64>,
}

impl FactorTable {
    /// Builds a table from a `T × n` array of means and its `T` dates.
    ///
    /// # Errors
    ///
    /// Returns [`CurveError::DateCountMismatch`] if the row count differs
    /// from the date count.
    pub fn from_means(dates: &[NaiveDate], means: &Array2<f64>) -> Result<Self, CurveError> {
        if dates.len() != means.nrows() {
            return Err(CurveError::DateCountMismatch {
                dates: dates.len(),
                rows: means.nrows(),
            });
        }
        Ok(Self {
            dates: dates.to_vec(),
            names: factor_names(means.ncols()),
            values: means.clone(),
        })
    }

    /// Rows dated on or after `start`.
    pub fn since(&self, start: NaiveDate) -> FactorTable {
        let keep: Vec<usize> = (0..self.dates.len())
            .filter(|&i| self.dates[i] >= start)
            .collect();
        FactorTable {
            dates: keep.iter().map(|&i| self.dates[i]).collect(),
            names: self.names.clone(),
            values: Array2::from_shape_fn((keep.len(), self.values.ncols()), |(i, j)| {
                self.values[[keep[i], j]]
            }),
        }
    }

    /// Row dates.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Factor column names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// `T × n` factor values.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Values of one factor over time.
    pub fn column(&self, j: usize) -> ArrayView1<'_, f64> {
        self.values.column(j)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Returns `true` if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}
