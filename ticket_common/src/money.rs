//! Decimal helpers for monetary amounts.
//!
//! Amounts travel through the system as `f64` values holding currency units (e.g. `12.34` EUR). Every helper in this
//! module rounds its result to the cent before returning it, so a chain of operations never accumulates more than
//! half a cent of floating-point noise. All monetary arithmetic in the workspace goes through these functions.
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MoneyError {
    #[error("Invalid currency amount: {0}")]
    InvalidAmount(String),
    #[error("Division by zero while dividing {0}")]
    DivisionByZero(f64),
}

/// Rounds half-up to two decimal places. `f64::EPSILON` is added first so that values such as `1.005`, which are
/// stored as `1.00499999…`, still round up. Negative zero is normalised to zero.
pub fn round_to_two_decimals(value: f64) -> f64 {
    let rounded = ((value + f64::EPSILON) * 100.0 + 0.5).floor() / 100.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Parses an amount the commerce platform sends as a decimal string, e.g. `"19.99"`.
pub fn parse_amount(value: &str) -> Result<f64, MoneyError> {
    let amount = value.trim().parse::<f64>().map_err(|e| MoneyError::InvalidAmount(format!("{value}. {e}")))?;
    if !amount.is_finite() {
        return Err(MoneyError::InvalidAmount(value.to_string()));
    }
    Ok(round_to_two_decimals(amount))
}

pub fn safe_add(a: f64, b: f64) -> f64 {
    round_to_two_decimals(a + b)
}

pub fn safe_sub(a: f64, b: f64) -> f64 {
    round_to_two_decimals(a - b)
}

pub fn safe_multiply(a: f64, b: f64) -> f64 {
    round_to_two_decimals(a * b)
}

pub fn safe_divide(a: f64, b: f64) -> Result<f64, MoneyError> {
    if b == 0.0 {
        return Err(MoneyError::DivisionByZero(a));
    }
    Ok(round_to_two_decimals(a / b))
}

/// Renders an amount with exactly two decimals, as the ERP expects (`"-157.02"`).
pub fn format_amount(value: f64) -> String {
    format!("{:.2}", round_to_two_decimals(value))
}

/// Renders a tax rate fraction as a whole percentage: `0.21` becomes `"21%"`.
pub fn format_tax_rate(rate: f64) -> String {
    format!("{:.0}%", rate * 100.0)
}
