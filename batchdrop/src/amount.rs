//! Human-readable amount parsing.
//!
//! Recipient lines carry decimal strings (`"12.5"`); transfers need integer base
//! units (`12_500_000` for a 6-decimal token). Conversion is exact: an amount that
//! cannot be represented in the token's precision is rejected instead of rounded.

use std::str::FromStr;

use rust_decimal::Decimal;

/// Why an amount string could not be converted to base units.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// Not a decimal number.
    #[error("invalid amount {0:?}: not a decimal number")]
    Malformed(String),
    /// Negative amounts are never valid.
    #[error("invalid amount {0}: must not be negative")]
    Negative(String),
    /// Sending zero is a no-op and almost always an input mistake.
    #[error("invalid amount {0}: must be greater than zero")]
    Zero(String),
    /// More fractional digits than the token supports.
    #[error("invalid amount {amount}: token supports at most {decimals} decimal places")]
    TooPrecise {
        /// The offending input.
        amount: String,
        /// Token decimals.
        decimals: u8,
    },
    /// The amount in base units does not fit the integer range.
    #[error("invalid amount {0}: too large")]
    Overflow(String),
}

/// Parses a decimal string into integer base units.
///
/// # Errors
///
/// Returns [`AmountError`] for malformed, negative, zero, over-precise or
/// overflowing amounts.
pub fn parse_units(input: &str, decimals: u8) -> Result<u128, AmountError> {
    let trimmed = input.trim();
    let value = Decimal::from_str(trimmed).map_err(|_| AmountError::Malformed(input.to_owned()))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AmountError::Negative(trimmed.to_owned()));
    }
    if value.is_zero() {
        return Err(AmountError::Zero(trimmed.to_owned()));
    }
    let value = value.normalize();
    let scale = value.scale();
    if scale > u32::from(decimals) {
        return Err(AmountError::TooPrecise {
            amount: trimmed.to_owned(),
            decimals,
        });
    }
    let mantissa = u128::try_from(value.mantissa())
        .map_err(|_| AmountError::Negative(trimmed.to_owned()))?;
    10u128
        .checked_pow(u32::from(decimals) - scale)
        .and_then(|factor| mantissa.checked_mul(factor))
        .ok_or_else(|| AmountError::Overflow(trimmed.to_owned()))
}

/// Formats base units as a decimal string with trailing zeros removed.
#[must_use]
pub fn format_units(units: u128, decimals: u8) -> String {
    let digits = units.to_string();
    let decimals = usize::from(decimals);
    if decimals == 0 {
        return digits;
    }
    let padded = format!("{digits:0>width$}", width = decimals + 1);
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_owned()
    } else {
        format!("{whole}.{fraction}")
    }
}
