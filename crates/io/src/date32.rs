//! Conversion between calendar dates and Arrow `Date32` day counts.

use chrono::{NaiveDate, TimeDelta};

use crate::error::IoError;

fn epoch() -> Result<NaiveDate, IoError> {
    NaiveDate::from_ymd_opt(1970, 1, 1).ok_or_else(|| IoError::InvalidDate {
        reason: "unix epoch is not representable".to_string(),
    })
}

/// Days since 1970-01-01.
pub(crate) fn to_days(date: NaiveDate) -> Result<i32, IoError> {
    let days = date.signed_duration_since(epoch()?).num_days();
    i32::try_from(days).map_err(|_| IoError::InvalidDate {
        reason: format!("{date} is outside the Date32 range"),
    })
}

/// Inverse of [`to_days`].
pub(crate) fn from_days(days: i32) -> Result<NaiveDate, IoError> {
    epoch()?
        .checked_add_signed(TimeDelta::days(i64::from(days)))
        .ok_or_else(|| IoError::InvalidDate {
            reason: format!("day offset {days} out of range"),
        })
}
