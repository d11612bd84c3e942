//! Fixed-point conversion between base units and decimal strings.
//!
//! VET and VTHO both carry 18 implied decimals. On-chain amounts stay in
//! `U256` base units; strings and `Decimal` only appear at the edges
//! (config input, display, ratios).

use std::str::FromStr;

use alloy::primitives::U256;
use rust_decimal::Decimal;
use thiserror::Error;

/// Decimals used by both VET and VTHO.
pub const TOKEN_DECIMALS: u8 = 18;

/// Errors that can occur when converting amounts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitsError {
    #[error("Invalid decimal amount: {0:?}")]
    InvalidAmount(String),

    #[error("Amount out of range: {0}")]
    Overflow(String),
}

/// `10^decimals` as a `U256`.
pub fn ten_pow(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

/// Parse a non-negative decimal string into base units.
///
/// Fractional digits beyond `decimals` are truncated, not rounded.
pub fn parse_units(value: &str, decimals: u8) -> Result<U256, UnitsError> {
    let trimmed = value.trim();
    let (int_part, frac_part) = trimmed.split_once('.').unwrap_or((trimmed, ""));

    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !is_digits(int_part) || !is_digits(frac_part)
    {
        return Err(UnitsError::InvalidAmount(value.to_string()));
    }

    let width = decimals as usize;
    let frac: String = frac_part.chars().take(width).collect();
    let digits = format!("{int_part}{frac:0<width$}");
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }

    U256::from_str_radix(digits, 10).map_err(|_| UnitsError::Overflow(value.to_string()))
}

/// Format base units as a decimal string without trailing fractional zeros.
pub fn format_units(value: U256, decimals: u8) -> String {
    let base = ten_pow(decimals);
    let int_part = value / base;
    let frac_part = value % base;
    if frac_part.is_zero() {
        return int_part.to_string();
    }

    let frac = format!("{:0>width$}", frac_part.to_string(), width = decimals as usize);
    format!("{}.{}", int_part, frac.trim_end_matches('0'))
}

/// Cut a decimal string to `places` fractional digits without rounding.
pub fn truncate(value: &str, places: usize) -> String {
    match value.split_once('.') {
        Some((int_part, _)) if places == 0 => int_part.to_string(),
        Some((int_part, frac)) => {
            let frac: String = frac.chars().take(places).collect();
            if frac.is_empty() {
                int_part.to_string()
            } else {
                format!("{int_part}.{frac}")
            }
        }
        None => value.to_string(),
    }
}

/// Convert base units to a `Decimal` for display and ratios.
///
/// Returns `None` when the value does not fit a `Decimal` (~7.9e28).
pub fn to_decimal(value: U256, decimals: u8) -> Option<Decimal> {
    Decimal::from_str(&format_units(value, decimals)).ok()
}

/// Convert a non-negative `Decimal` into base units.
pub fn from_decimal(value: Decimal, decimals: u8) -> Result<U256, UnitsError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(UnitsError::InvalidAmount(value.to_string()));
    }
    parse_units(&value.normalize().to_string(), decimals)
}
