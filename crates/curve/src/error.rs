//! Error types for the yieldkf-curve crate.

use chrono::NaiveDate;
use yieldkf_ssm::SsmError;

/// Error type for all fallible operations in the yieldkf-curve crate.
///
/// Covers maturity label parsing, yield panel and factor table
/// construction, and errors from the state-space engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CurveError {
    /// State-space engine error.
    #[error(transparent)]
    Ssm(#[from] SsmError),

    /// Returned when a column label is not `<number> MO` or `<number> YR`.
    #[error("invalid maturity label '{label}'")]
    InvalidMaturityLabel {
        /// The rejected label.
        label: String,
    },

    /// Returned when dates are not strictly increasing.
    #[error("dates must be strictly increasing: {current} follows {previous}")]
    UnsortedDates {
        /// Date of the earlier row.
        previous: NaiveDate,
        /// Offending date.
        current: NaiveDate,
    },

    /// Returned when a row does not have one value per column.
    #[error("row {row} has {got} values, expected {expected}")]
    RowWidthMismatch {
        /// Zero-based row index.
        row: usize,
        /// Number of columns.
        expected: usize,
        /// Number of values in the row.
        got: usize,
    },

    /// Returned when the number of dates and rows differ.
    #[error("{dates} dates for {rows} rows")]
    DateCountMismatch {
        /// Number of dates.
        dates: usize,
        /// Number of rows.
        rows: usize,
    },

    /// Returned when a present cell is NaN or infinite.
    #[error("non-finite value at row {row}, column '{column}'")]
    NonFiniteCell {
        /// Zero-based row index.
        row: usize,
        /// Column label.
        column: String,
    },

    /// Returned when a panel has no columns, or two panels have different
    /// columns.
    #[error("column mismatch: {reason}")]
    ColumnMismatch {
        /// Description of the mismatch.
        reason: String,
    },

    /// Returned when an operation needs at least one row.
    #[error("yield panel is empty")]
    EmptyPanel,
}
