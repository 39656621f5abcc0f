//! Decay engine implementing the [`DecayCalculator`] trait.
//!
//! Voting power decays linearly from `amount` (with a full
//! [`MAX_LOCK_DURATION`] remaining) to zero at `end`. Penalties scale the
//! configured maximum rate by `remaining / (end - effective_start)`.
//! All products are taken in a 256-bit intermediate before the single division.

use vela_core::constants::{BPS_PRECISION, MAX_LOCK_DURATION};
use vela_core::error::MathError;
use vela_core::math::{mul_div, mul_mul_div, weighted_average};
use vela_core::traits::DecayCalculator;
use vela_core::types::{LockedBalance, Timestamp};

/// The production decay calculator.
///
/// Stateless: every method is a pure function of its inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecayEngine;

impl DecayEngine {
    /// Create a new DecayEngine.
    pub fn new() -> Self {
        Self
    }

    /// Effective penalty rate in BPS applied to `lock` at `now`.
    ///
    /// Rounds down. Useful for reporting; the penalty itself is computed in one
    /// step by [`DecayCalculator::early_exit_penalty`].
    pub fn penalty_rate_bps(
        &self,
        lock: &LockedBalance,
        now: Timestamp,
        max_penalty_bps: u64,
    ) -> Result<u64, MathError> {
        if lock.is_permanent {
            return Ok(max_penalty_bps);
        }
        let remaining = lock.remaining(now);
        if remaining == 0 {
            return Ok(0);
        }
        let total = lock.end.saturating_sub(lock.effective_start).max(remaining);
        let rate = mul_div(max_penalty_bps as u128, remaining as u128, total as u128)?;
        u64::try_from(rate).map_err(|_| MathError::ArithmeticOverflow)
    }
}

fn to_timestamp(value: u128) -> Result<Timestamp, MathError> {
    Timestamp::try_from(value).map_err(|_| MathError::ArithmeticOverflow)
}

impl DecayCalculator for DecayEngine {
    fn voting_power(&self, lock: &LockedBalance, now: Timestamp) -> Result<u128, MathError> {
        if lock.is_permanent {
            return Ok(lock.amount);
        }
        if lock.is_expired(now) {
            return Ok(0);
        }
        // power = amount * (end - now) / MAX, multiply first.
        mul_div(lock.amount, (lock.end - now) as u128, MAX_LOCK_DURATION as u128)
    }

    fn early_exit_penalty(
        &self,
        lock: &LockedBalance,
        now: Timestamp,
        max_penalty_bps: u64,
    ) -> Result<u128, MathError> {
        if lock.is_permanent {
            return mul_div(lock.amount, max_penalty_bps as u128, BPS_PRECISION as u128);
        }
        let remaining = lock.remaining(now);
        if remaining == 0 || lock.amount == 0 {
            return Ok(0);
        }
        // effective_start <= now < end keeps total >= remaining; the max() only
        // matters for a start recorded after `now`, which caps the rate at 100%.
        let total = lock.end.saturating_sub(lock.effective_start).max(remaining);
        let denominator = (total as u128)
            .checked_mul(BPS_PRECISION as u128)
            .ok_or(MathError::ArithmeticOverflow)?;
        mul_mul_div(lock.amount, max_penalty_bps, remaining, denominator)
    }

    fn effective_start_after_deposit(
        &self,
        lock: &LockedBalance,
        added: u128,
        now: Timestamp,
    ) -> Result<Timestamp, MathError> {
        if lock.amount == 0 {
            return Ok(now);
        }
        if added == 0 {
            return Ok(lock.effective_start);
        }
        let start = weighted_average(
            lock.effective_start as u128,
            lock.amount,
            now as u128,
            added,
        )?;
        to_timestamp(start)
    }

    fn merged_effective_start(
        &self,
        a: &LockedBalance,
        b: &LockedBalance,
    ) -> Result<Timestamp, MathError> {
        let start = weighted_average(
            a.effective_start as u128,
            a.amount,
            b.effective_start as u128,
            b.amount,
        )?;
        to_timestamp(start)
    }
}
