//! The epoch walk behind every claim.
//!
//! [`accrue`] is a pure function: given the voting power history, the
//! per-epoch buckets and a position's [`RewardCursor`], it returns what the
//! position is owed up to a timestamp and the cursor to store afterwards.
//! The distributor commits the cursor before paying out.
//!
//! A boundary is only walked once the clock has moved past it: while `now`
//! sits exactly on boundary `b`, a later change at that same instant still
//! rewrites the samples at `b`.

use serde::{Deserialize, Serialize};
use tracing::trace;

use vela_core::constants::REMAINDER_SCALE;
use vela_core::epoch::{boundaries, epoch_next, epoch_start, is_epoch_boundary};
use vela_core::error::MathError;
use vela_core::math::scaled_share;
use vela_core::traits::VotingPowerSource;
use vela_core::types::{PositionId, Timestamp};

/// Per `(token, position)` progress.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RewardCursor {
    /// Rewards are realized up to this timestamp. Never decreases.
    pub last_earn: Timestamp,
    /// Carried fractional reward in units of `1 / REMAINDER_SCALE`.
    pub remainder: u128,
}

/// Outcome of one walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Accrual {
    /// Whole units payable now.
    pub amount: u128,
    /// Cursor to store after paying `amount`.
    pub cursor: RewardCursor,
    /// Epoch boundaries visited, including zero-supply ones.
    pub epochs: u64,
}

/// Walk every epoch boundary in `[epoch_next(max(last_earn, mint_time)), epoch_start(end)]`
/// and sum position `id`'s share of each bucket.
///
/// Epochs with zero aggregate supply are skipped and their bucket is never
/// paid to anyone. The cursor only moves when at least one boundary is in range.
///
/// When `end` reaches `now` and `now` is a boundary, the walk stops one second
/// short so that boundary is settled by a later call.
pub fn accrue(
    source: &dyn VotingPowerSource,
    id: PositionId,
    mint_time: Timestamp,
    cursor: RewardCursor,
    end: Timestamp,
    now: Timestamp,
    bucket: impl Fn(Timestamp) -> u128,
) -> Result<Accrual, MathError> {
    let end = if end >= now && is_epoch_boundary(end) { end.saturating_sub(1) } else { end };
    let first = epoch_next(cursor.last_earn.max(mint_time));
    let last = epoch_start(end);
    if first > last {
        return Ok(Accrual { amount: 0, cursor, epochs: 0 });
    }

    let mut amount: u128 = 0;
    let mut remainder = cursor.remainder;
    let mut epochs = 0u64;
    for t in boundaries(first, last) {
        epochs += 1;
        let supply = source.total_supply_at(t)?;
        if supply == 0 {
            trace!(id, epoch = t, "zero supply epoch skipped");
            continue;
        }
        let reward = bucket(t);
        if reward == 0 {
            continue;
        }
        let balance = source.balance_of_at(id, t)?;
        if balance == 0 {
            continue;
        }
        let (whole, fraction) = scaled_share(reward, balance, supply, REMAINDER_SCALE)?;
        amount = amount.checked_add(whole).ok_or(MathError::ArithmeticOverflow)?;
        remainder = remainder.checked_add(fraction).ok_or(MathError::ArithmeticOverflow)?;
    }

    amount = amount
        .checked_add(remainder / REMAINDER_SCALE)
        .ok_or(MathError::ArithmeticOverflow)?;
    remainder %= REMAINDER_SCALE;

    Ok(Accrual { amount, cursor: RewardCursor { last_earn: end, remainder }, epochs })
}
