/*
[INPUT]:  Exact decimal values (sizes, prices, amounts)
[OUTPUT]: Scaled unsigned integers for on-chain encoding, and the inverse
[POS]:    Data layer - fixed-point codec shared by validation and signing
[UPDATE]: When the venue changes its on-chain scale
*/

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::{GrvtError, Result};

/// Decimal places of leg prices in the signed struct
pub const PRICE_DECIMALS: u32 = 9;
/// Decimal places of leg sizes in the signed struct
pub const SIZE_DECIMALS: u32 = 9;

const MAX_DECIMALS: u32 = 18;

fn scale_factor(decimals: u32) -> Result<Decimal> {
    if decimals > MAX_DECIMALS {
        return Err(GrvtError::validation(format!(
            "fixed-point scale 1e{decimals} exceeds 1e{MAX_DECIMALS}"
        )));
    }
    Ok(Decimal::from(10u64.pow(decimals)))
}

/// Scale `value` by `10^decimals` using exact decimal arithmetic.
///
/// Values with more fractional digits than `decimals`, negative values, and
/// results outside `u64` are rejected rather than rounded.
pub fn to_fixed_point(value: Decimal, decimals: u32) -> Result<u64> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(GrvtError::validation(format!(
            "{value} is negative and has no unsigned fixed-point form"
        )));
    }
    let scaled = value
        .checked_mul(scale_factor(decimals)?)
        .ok_or_else(|| GrvtError::validation(format!("{value} overflows at scale 1e{decimals}")))?;
    if !scaled.fract().is_zero() {
        return Err(GrvtError::validation(format!(
            "{value} has more than {decimals} decimal places"
        )));
    }
    scaled
        .to_u64()
        .ok_or_else(|| GrvtError::validation(format!("{value} does not fit u64 at scale 1e{decimals}")))
}

/// Inverse of [`to_fixed_point`], normalized (no trailing zeros).
pub fn from_fixed_point(raw: u64, decimals: u32) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(raw), decimals.min(MAX_DECIMALS)).normalize()
}
