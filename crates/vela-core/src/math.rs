//! Full-precision integer helpers.
//!
//! Products of two `u128` values can need 256 bits. Every helper here
//! multiplies in a 256-bit intermediate before dividing and fails with
//! [`MathError::ArithmeticOverflow`] when the final result does not fit.

use alloy_primitives::U256;

use crate::error::MathError;

fn narrow(value: U256) -> Result<u128, MathError> {
    u128::try_from(value).map_err(|_| MathError::ArithmeticOverflow)
}

/// `floor(a * b / d)`.
///
/// # Examples
///
/// ```
/// use vela_core::math::mul_div;
/// assert_eq!(mul_div(u128::MAX, 4, 8).unwrap(), u128::MAX / 2);
/// assert_eq!(mul_div(7, 3, 2).unwrap(), 10);
/// ```
pub fn mul_div(a: u128, b: u128, d: u128) -> Result<u128, MathError> {
    if d == 0 {
        return Err(MathError::DivisionByZero);
    }
    narrow(U256::from(a) * U256::from(b) / U256::from(d))
}

/// `(floor(a * b / d), (a * b) mod d)`.
pub fn mul_div_rem(a: u128, b: u128, d: u128) -> Result<(u128, u128), MathError> {
    if d == 0 {
        return Err(MathError::DivisionByZero);
    }
    let product = U256::from(a) * U256::from(b);
    let divisor = U256::from(d);
    Ok((narrow(product / divisor)?, narrow(product % divisor)?))
}

/// Proportional share of `total` for `part / whole`, split into the whole
/// units and the discarded fraction scaled by `scale`.
///
/// Returns `(floor(total * part / whole), ((total * part) mod whole) * scale / whole)`.
/// The fraction is taken from the exact remainder, not from a second rounded
/// division, so no precision is lost before it is scaled.
///
/// # Examples
///
/// ```
/// use vela_core::math::scaled_share;
/// // 10 * 1 / 4 = 2.5 -> 2 whole units, half a unit at scale 100.
/// assert_eq!(scaled_share(10, 1, 4, 100).unwrap(), (2, 50));
/// ```
pub fn scaled_share(total: u128, part: u128, whole: u128, scale: u128) -> Result<(u128, u128), MathError> {
    let (units, rem) = mul_div_rem(total, part, whole)?;
    let fraction = mul_div(rem, scale, whole)?;
    Ok((units, fraction))
}

/// `floor(a * b * c / d)` with a single rounding step.
///
/// Used for rate-times-ratio formulas such as
/// `amount * bps * remaining / (total * BPS_PRECISION)`.
pub fn mul_mul_div(a: u128, b: u64, c: u64, d: u128) -> Result<u128, MathError> {
    if d == 0 {
        return Err(MathError::DivisionByZero);
    }
    narrow(U256::from(a) * U256::from(b) * U256::from(c) / U256::from(d))
}

/// Weighted average `floor((x * wx + y * wy) / (wx + wy))`.
///
/// The result always lies in `[min(x, y), max(x, y)]`.
pub fn weighted_average(x: u128, wx: u128, y: u128, wy: u128) -> Result<u128, MathError> {
    let weight = U256::from(wx) + U256::from(wy);
    if weight.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let sum = U256::from(x) * U256::from(wx) + U256::from(y) * U256::from(wy);
    narrow(sum / weight)
}

/// Convert an unsigned amount into the signed curve domain.
pub fn to_signed(value: u128) -> Result<i128, MathError> {
    i128::try_from(value).map_err(|_| MathError::ArithmeticOverflow)
}
