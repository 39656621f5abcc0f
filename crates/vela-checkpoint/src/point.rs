//! Curve samples.
//!
//! A [`Point`] pins the curve at `ts`: scaled voting power equals `bias` and
//! falls by `slope` per second afterwards, never below zero. `permanent` is
//! the non-decaying balance added on top.

use serde::{Deserialize, Serialize};

use vela_core::constants::{MAX_LOCK_DURATION, MAX_LOCK_DURATION_I128};
use vela_core::error::MathError;
use vela_core::math::to_signed;
use vela_core::types::{LockedBalance, Timestamp};

/// One sample of a voting power curve, in scaled units.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Point {
    /// Scaled decaying power at `ts` (power × `MAX_LOCK_DURATION`).
    pub bias: i128,
    /// Scaled decay per second.
    pub slope: i128,
    /// Time of the sample.
    pub ts: Timestamp,
    /// Non-decaying balance held in permanent locks at `ts`.
    pub permanent: u128,
}

impl Point {
    /// An empty sample at `ts`.
    pub fn zero(ts: Timestamp) -> Self {
        Self { ts, ..Self::default() }
    }

    /// Scaled decaying component at `t >= ts`, floored at zero.
    pub fn bias_at(&self, t: Timestamp) -> Result<i128, MathError> {
        decay(self.bias, self.slope, t.saturating_sub(self.ts))
    }

    /// Voting power at `t >= ts`: the decayed component unscaled, plus the
    /// permanent balance.
    pub fn value_at(&self, t: Timestamp) -> Result<u128, MathError> {
        unscale(self.bias_at(t)?, self.permanent)
    }
}

/// `max(bias - slope * dt, 0)`.
pub(crate) fn decay(bias: i128, slope: i128, dt: u64) -> Result<i128, MathError> {
    let drop = slope.checked_mul(dt as i128).ok_or(MathError::ArithmeticOverflow)?;
    Ok(bias.checked_sub(drop).ok_or(MathError::ArithmeticOverflow)?.max(0))
}

/// Convert a scaled bias into whole voting power and add the permanent part.
pub(crate) fn unscale(bias: i128, permanent: u128) -> Result<u128, MathError> {
    let decaying = (bias.max(0) / MAX_LOCK_DURATION_I128) as u128;
    decaying.checked_add(permanent).ok_or(MathError::ArithmeticOverflow)
}

/// Scaled `(bias, slope)` a lock contributes to the decaying curve at `now`.
///
/// Permanent and expired locks contribute nothing; a live timed lock
/// contributes `slope = amount` and `bias = amount * (end - now)`.
///
/// # Examples
///
/// ```
/// use vela_checkpoint::scaled_curve;
/// use vela_core::types::LockedBalance;
/// let lock = LockedBalance::timed(10, 1_000, 0);
/// assert_eq!(scaled_curve(&lock, 400).unwrap(), (6_000, 10));
/// assert_eq!(scaled_curve(&lock, 1_000).unwrap(), (0, 0));
/// ```
pub fn scaled_curve(lock: &LockedBalance, now: Timestamp) -> Result<(i128, i128), MathError> {
    if lock.is_permanent || lock.is_expired(now) || lock.amount == 0 {
        return Ok((0, 0));
    }
    let slope = to_signed(lock.amount)?;
    let remaining = lock.end - now;
    debug_assert!(remaining <= MAX_LOCK_DURATION);
    let bias = slope.checked_mul(remaining as i128).ok_or(MathError::ArithmeticOverflow)?;
    Ok((bias, slope))
}
