//! Conversion between human-readable decimal amounts and on-chain base units
//!
//! The base-unit side is always integer (`U256`); the decimal side uses
//! `rust_decimal`. Every conversion truncates toward zero so a transaction
//! never carries more value than the user asked for.

use crate::{Error, Result};
use alloy::primitives::U256;
use rust_decimal::Decimal;

/// Largest mantissa representable by `Decimal` (2^96 - 1)
const MAX_DECIMAL_MANTISSA: u128 = 79_228_162_514_264_337_593_543_950_335;

/// Maximum scale supported by `Decimal`
const MAX_DECIMAL_SCALE: u32 = 28;

/// Native asset decimals on EVM chains
pub const NATIVE_DECIMALS: u8 = 18;

fn pow10(exp: u32) -> Option<U256> {
    U256::from(10u8).checked_pow(U256::from(exp))
}

/// Convert a decimal amount into integer base units.
///
/// Fails with `InvalidAmount` when the amount is not positive, does not fit in
/// 256 bits, or is smaller than one base unit.
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<U256> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount(format!(
            "amount must be greater than zero, got {}",
            amount
        )));
    }

    let mantissa = U256::from(amount.mantissa().unsigned_abs());
    let scale = amount.scale();
    let decimals = u32::from(decimals);

    let base = if decimals >= scale {
        pow10(decimals - scale)
            .and_then(|factor| mantissa.checked_mul(factor))
            .ok_or_else(|| Error::InvalidAmount(format!("amount {} is too large", amount)))?
    } else {
        // scale is at most 28 so the divisor always fits
        let divisor = pow10(scale - decimals)
            .ok_or_else(|| Error::InvalidAmount(format!("amount {} is too precise", amount)))?;
        mantissa / divisor
    };

    if base.is_zero() {
        return Err(Error::InvalidAmount(format!(
            "amount {} is smaller than one base unit ({} decimals)",
            amount, decimals
        )));
    }

    Ok(base)
}

/// Convert integer base units back into a decimal amount.
///
/// Exact whenever the result fits in 28 significant digits; otherwise the
/// least significant fractional digits are dropped.
pub fn from_base_units(amount: U256, decimals: u8) -> Result<Decimal> {
    let decimals = u32::from(decimals);
    let mut scale = decimals.min(MAX_DECIMAL_SCALE);

    // Anything below 10^-28 cannot be represented and is truncated away.
    let mut mantissa = match pow10(decimals - scale) {
        Some(divisor) => amount / divisor,
        None => U256::ZERO,
    };

    let limit = U256::from(MAX_DECIMAL_MANTISSA);
    while mantissa > limit {
        if scale == 0 {
            return Err(Error::InvalidAmount(format!(
                "{} base units with {} decimals exceeds the decimal range",
                amount, decimals
            )));
        }
        mantissa /= U256::from(10u8);
        scale -= 1;
    }

    let mantissa = mantissa.to::<u128>() as i128;
    Decimal::try_from_i128_with_scale(mantissa, scale)
        .map(|d| d.normalize())
        .map_err(|e| Error::InvalidAmount(e.to_string()))
}

/// Parse a user-supplied amount string.
pub fn parse_amount(input: &str) -> Result<Decimal> {
    let trimmed = input.trim();
    trimmed
        .parse::<Decimal>()
        .map_err(|_| Error::InvalidAmount(format!("'{}' is not a number", trimmed)))
}

/// Format a U256 value with decimals
pub fn format_units(value: U256, decimals: u8) -> String {
    if value.is_zero() {
        return "0".to_string();
    }

    let divisor = match pow10(u32::from(decimals)) {
        Some(d) => d,
        None => return format!("0.{:0>width$}", value, width = decimals as usize),
    };
    let whole = value / divisor;
    let remainder = value % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let remainder_str = format!("{:0>width$}", remainder, width = decimals as usize);
        let trimmed = remainder_str.trim_end_matches('0');
        if trimmed.is_empty() {
            whole.to_string()
        } else {
            format!("{}.{}", whole, trimmed)
        }
    }
}

/// Minimum acceptable output: `floor(expected * (1 - slippage / 100))`.
pub fn apply_slippage(expected: U256, slippage_percent: Decimal) -> Result<U256> {
    if slippage_percent < Decimal::ZERO || slippage_percent >= Decimal::ONE_HUNDRED {
        return Err(Error::InvalidArgument(format!(
            "slippage must be in [0, 100), got {}",
            slippage_percent
        )));
    }

    let keep = Decimal::ONE_HUNDRED - slippage_percent;
    let numerator = U256::from(keep.mantissa().unsigned_abs());
    let denominator = pow10(keep.scale())
        .and_then(|p| p.checked_mul(U256::from(100u8)))
        .ok_or_else(|| Error::InvalidArgument("slippage is too precise".to_string()))?;

    expected
        .checked_mul(numerator)
        .map(|scaled| scaled / denominator)
        .ok_or_else(|| Error::InvalidAmount(format!("expected output {} is too large", expected)))
}
