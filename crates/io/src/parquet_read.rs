//! Low-level Parquet reading and column extraction.

use std::path::Path;

use arrow::array::{Array, AsArray, RecordBatch};
use arrow::datatypes::{DataType, Date32Type, Float64Type, Schema};
use chrono::NaiveDate;
use ndarray::Array2;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use yieldkf_curve::{FactorTable, YieldPanel};

use crate::date32;
use crate::error::IoError;
use crate::parquet_write::DATE_COLUMN;

/// Reads the schema and all record batches from a Parquet file.
///
/// # Errors
///
/// Returns [`IoError::FileNotFound`] if the file does not exist, or
/// [`IoError::Parquet`] if the file cannot be decoded.
pub(crate) fn read_batches(path: &Path) -> Result<(Schema, Vec<RecordBatch>), IoError> {
    if !path.exists() {
        return Err(IoError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let file = std::fs::File::open(path).map_err(|e| IoError::filesystem(path, e))?;

    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().as_ref().clone();
    let reader = builder.build()?;

    let batches = reader.collect::<Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}

/// Validates a dated table schema and returns its value column names.
///
/// The first column must be `date` of type Date32 and every remaining
/// column must be Float64. All mismatches are reported together.
///
/// # Errors
///
/// Returns [`IoError::Validation`] listing every offending column.
pub(crate) fn validate_schema(schema: &Schema) -> Result<Vec<String>, IoError> {
    let fields = schema.fields();
    if fields.len() < 2 {
        return Err(IoError::validation(format!(
            "expected a date column and at least one value column, got {} column(s)",
            fields.len()
        )));
    }

    let mut mismatches: Vec<String> = Vec::new();
    let first = &fields[0];
    if first.name() != DATE_COLUMN {
        mismatches.push(format!(
            "column 0: expected '{DATE_COLUMN}', got '{}'",
            first.name()
        ));
    }
    if first.data_type() != &DataType::Date32 {
        mismatches.push(format!(
            "column 0: expected Date32, got {}",
            first.data_type()
        ));
    }
    for (i, field) in fields.iter().enumerate().skip(1) {
        if field.data_type() != &DataType::Float64 {
            mismatches.push(format!(
                "column {i} ('{}'): expected Float64, got {}",
                field.name(),
                field.data_type()
            ));
        }
    }

    if !mismatches.is_empty() {
        return Err(IoError::Validation {
            count: mismatches.len(),
            details: mismatches.join("; "),
        });
    }

    Ok(fields.iter().skip(1).map(|f| f.name().clone()).collect())
}

/// Dates and optional cells of every row across all batches.
///
/// Nulls and NaN values are both read as missing.
fn collect_rows(
    batches: &[RecordBatch],
    n_values: usize,
) -> Result<(Vec<NaiveDate>, Vec<Vec<Option<f64>>>), IoError> {
    let mut dates = Vec::new();
    let mut rows = Vec::new();

    for batch in batches {
        let date_col = batch
            .column(0)
            .as_primitive_opt::<Date32Type>()
            .ok_or_else(|| IoError::validation("column 0 is not Date32"))?;
        let value_cols = (1..=n_values)
            .map(|j| {
                batch
                    .column(j)
                    .as_primitive_opt::<Float64Type>()
                    .ok_or_else(|| IoError::validation(format!("column {j} is not Float64")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for row in 0..batch.num_rows() {
            if date_col.is_null(row) {
                return Err(IoError::validation(format!(
                    "row {} has a null date",
                    dates.len()
                )));
            }
            dates.push(date32::from_days(date_col.value(row))?);
            rows.push(
                value_cols
                    .iter()
                    .map(|col| {
                        if col.is_null(row) || col.value(row).is_nan() {
                            None
                        } else {
                            Some(col.value(row))
                        }
                    })
                    .collect(),
            );
        }
    }

    Ok((dates, rows))
}

/// Assembles a [`YieldPanel`] from validated batches.
pub(crate) fn batches_to_panel(
    labels: Vec<String>,
    batches: &[RecordBatch],
) -> Result<YieldPanel, IoError> {
    let (dates, rows) = collect_rows(batches, labels.len())?;
    Ok(YieldPanel::new(dates, labels, rows)?)
}

/// Assembles a [`FactorTable`] from validated batches.
///
/// # Errors
///
/// Returns [`IoError::Validation`] if a factor cell is null.
pub(crate) fn batches_to_factors(
    names: &[String],
    batches: &[RecordBatch],
) -> Result<FactorTable, IoError> {
    let (dates, rows) = collect_rows(batches, names.len())?;
    let mut values = Array2::zeros((rows.len(), names.len()));
    for (i, row) in rows.iter().enumerate() {
        for (j, cell) in row.iter().enumerate() {
            values[[i, j]] = cell.ok_or_else(|| {
                IoError::validation(format!("row {i}, factor '{}' is missing", names[j]))
            })?;
        }
    }
    let table = FactorTable::from_means(&dates, &values)?;
    if table.names() != names {
        return Err(IoError::validation(format!(
            "factor columns {names:?} do not match {:?}",
            table.names()
        )));
    }
    Ok(table)
}
