//! High-level Parquet readers for yield panels and factor tables.

use std::path::Path;

use tracing::{debug, info};
use yieldkf_curve::{FactorTable, YieldPanel};

use crate::error::IoError;
use crate::parquet_read;

/// Reads a yield panel written by [`write_yields`](crate::write_yields) or
/// any Parquet file with the same layout.
///
/// Column labels after `date` must parse as maturities. Null or NaN cells
/// are read as missing. A file with a valid schema and no rows yields an
/// empty panel.
///
/// # Errors
///
/// | Variant | Trigger |
/// |---------|---------|
/// | [`IoError::FileNotFound`] | `path` does not exist |
/// | [`IoError::Parquet`] | the file cannot be decoded |
/// | [`IoError::Validation`] | schema is not `date` + Float64 columns |
/// | [`IoError::Curve`] | bad maturity label or unsorted dates |
pub fn read_yields(path: &Path) -> Result<YieldPanel, IoError> {
    let (schema, batches) = parquet_read::read_batches(path)?;
    let labels = parquet_read::validate_schema(&schema)?;
    debug!(batches = batches.len(), ?labels, "yield schema validated");
    let panel = parquet_read::batches_to_panel(labels, &batches)?;
    info!(path = %path.display(), rows = panel.len(), columns = panel.n_columns(), "read yield panel");
    Ok(panel)
}

/// Reads a factor table written by [`write_factors`](crate::write_factors).
///
/// # Errors
///
/// As for [`read_yields`]; additionally [`IoError::Validation`] if a factor
/// value is null or the column names are not the standard factor names.
pub fn read_factors(path: &Path) -> Result<FactorTable, IoError> {
    let (schema, batches) = parquet_read::read_batches(path)?;
    let names = parquet_read::validate_schema(&schema)?;
    parquet_read::batches_to_factors(&names, &batches)
}
