//! Decimal parsing and rounding helpers

use bigdecimal::{BigDecimal, RoundingMode};
use std::str::FromStr;

/// Largest decimal exponent, either direction, accepted for a cell value
pub const MAX_DECIMAL_EXPONENT: i64 = 64;

/// Most significant digits accepted for a cell value
pub const MAX_DECIMAL_DIGITS: u64 = 64;

/// Parse a numeric cell.
///
/// Accepts thousands separators (`1,234.50`), accounting negatives (`(50.00)`),
/// a leading currency symbol and surrounding whitespace. Values outside
/// [`within_magnitude`] are rejected.
pub fn parse_decimal(text: &str) -> Option<BigDecimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (negated, body) = match trimmed
        .strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
    {
        Some(inner) => (true, inner.trim()),
        None => (false, trimmed),
    };

    let cleaned: String = body
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();

    let value = BigDecimal::from_str(&cleaned).ok()?;
    if !within_magnitude(&value) {
        return None;
    }
    Some(if negated { -value } else { value })
}

/// Whether a value is small enough to sum and round cheaply.
///
/// Rounding materializes every digit up to the exponent, so `1e2000000000`
/// must never reach it.
pub fn within_magnitude(value: &BigDecimal) -> bool {
    let (_, scale) = value.as_bigint_and_exponent();
    scale.abs() <= MAX_DECIMAL_EXPONENT && value.digits() <= MAX_DECIMAL_DIGITS
}

/// Round half away from zero to `precision` decimal places
pub fn round_half_up(value: &BigDecimal, precision: u32) -> BigDecimal {
    value.with_scale_round(i64::from(precision), RoundingMode::HalfUp)
}
