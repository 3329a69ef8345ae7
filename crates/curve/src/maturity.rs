//! Maturity labels such as `"6 MO"` and `"10 YR"`.

use crate::error::CurveError;

/// Parses a maturity label into fractional years.
///
/// Accepts a non-negative number followed by `MO` (months) or `YR`
/// (years), case-insensitive, with optional whitespace between them.
///
/// # Errors
///
/// Returns [`CurveError::InvalidMaturityLabel`] for any other shape.
///
/// # Example
///
/// ```
/// use yieldkf_curve::parse_maturity;
///
/// assert_eq!(parse_maturity("10 YR").unwrap(), 10.0);
/// assert_eq!(parse_maturity("6 MO").unwrap(), 0.5);
/// assert_eq!(parse_maturity("3mo").unwrap(), 0.25);
/// ```
pub fn parse_maturity(label: &str) -> Result<f64, CurveError> {
    let invalid = || CurveError::InvalidMaturityLabel {
        label: label.to_string(),
    };
    let trimmed = label.trim();
    if trimmed.len() < 2 || !trimmed.is_char_boundary(trimmed.len() - 2) {
        return Err(invalid());
    }
    let (number, unit) = trimmed.split_at(trimmed.len() - 2);
    let per_year = match unit.to_ascii_uppercase().as_str() {
        "MO" => 12.0,
        "YR" => 1.0,
        _ => return Err(invalid()),
    };
    let value: f64 = number.trim_end().parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }
    Ok(value / per_year)
}

/// Parses every label, in order.
///
/// # Errors
///
/// Returns the first [`CurveError::InvalidMaturityLabel`].
pub fn parse_maturities<S: AsRef<str>>(labels: &[S]) -> Result<Vec<f64>, CurveError> {
    labels.iter().map(|l| parse_maturity(l.as_ref())).collect()
}
