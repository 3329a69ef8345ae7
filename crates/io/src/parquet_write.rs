//! Low-level Parquet column building.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Date32Array, Float64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use chrono::NaiveDate;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use yieldkf_curve::{FactorTable, YieldPanel};

use crate::date32;
use crate::error::IoError;

/// Name of the leading date column in every table.
pub(crate) const DATE_COLUMN: &str = "date";

/// Builds a schema of a non-null `date` column followed by one Float64
/// column per name.
pub(crate) fn build_schema<S: AsRef<str>>(names: &[S], nullable: bool) -> Schema {
    let mut fields = Vec::with_capacity(names.len() + 1);
    fields.push(Field::new(DATE_COLUMN, DataType::Date32, false));
    fields.extend(
        names
            .iter()
            .map(|n| Field::new(n.as_ref(), DataType::Float64, nullable)),
    );
    Schema::new(fields)
}

fn date_column(dates: &[NaiveDate]) -> Result<ArrayRef, IoError> {
    let days = dates
        .iter()
        .map(|&d| date32::to_days(d))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Arc::new(Date32Array::from(days)))
}

/// Converts a [`YieldPanel`] into a record batch; missing cells become nulls.
pub(crate) fn panel_to_record_batch(
    panel: &YieldPanel,
    schema: &Schema,
) -> Result<RecordBatch, IoError> {
    let mut columns = Vec::with_capacity(panel.n_columns() + 1);
    columns.push(date_column(panel.dates())?);
    for j in 0..panel.n_columns() {
        let cells: Vec<Option<f64>> = panel.rows().iter().map(|row| row[j]).collect();
        columns.push(Arc::new(Float64Array::from(cells)) as ArrayRef);
    }
    Ok(RecordBatch::try_new(Arc::new(schema.clone()), columns)?)
}

/// Converts a [`FactorTable`] into a record batch.
pub(crate) fn factors_to_record_batch(
    table: &FactorTable,
    schema: &Schema,
) -> Result<RecordBatch, IoError> {
    let mut columns = Vec::with_capacity(table.names().len() + 1);
    columns.push(date_column(table.dates())?);
    for j in 0..table.names().len() {
        columns.push(Arc::new(Float64Array::from(table.column(j).to_vec())) as ArrayRef);
    }
    Ok(RecordBatch::try_new(Arc::new(schema.clone()), columns)?)
}

/// Writes a sequence of [`RecordBatch`]es to a Parquet file at `path`.
///
/// # Errors
///
/// Returns [`IoError::Filesystem`] if the file cannot be created, or
/// [`IoError::Parquet`] if batch writing or file finalisation fails.
pub(crate) fn write_batches(
    path: &Path,
    batches: &[RecordBatch],
    schema: &Schema,
    props: WriterProperties,
) -> Result<(), IoError> {
    let file = std::fs::File::create(path).map_err(|e| IoError::filesystem(path, e))?;
    let mut writer = ArrowWriter::try_new(file, Arc::new(schema.clone()), Some(props))?;

    for batch in batches {
        writer.write(batch)?;
    }

    writer.close()?;
    Ok(())
}
