//! The checkpoint engine: global and per-position voting power curves.
//!
//! Every lock mutation reports the position's old and new [`LockedBalance`].
//! The engine forward-fills the global curve to `now`, swaps the position's
//! old contribution for the new one, reschedules the slope change at the
//! lock end, and records a fresh sample for the position.
//!
//! The global curve is the exact sum of the scaled position curves, so
//! aggregate supply only loses precision in the final unscaling division.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use vela_core::error::{CheckpointError, MathError};
use vela_core::types::{LockedBalance, PositionId, Timestamp};

use crate::history::PointHistory;
use crate::point::{Point, decay, scaled_curve, unscale};
use crate::schedule::SlopeSchedule;

/// Global and per-position curve histories plus the slope-change schedule.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckpointEngine {
    global: PointHistory,
    positions: HashMap<PositionId, PointHistory>,
    schedule: SlopeSchedule,
    permanent_total: u128,
}

impl CheckpointEngine {
    /// Create an engine with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the global curve to `to`.
    ///
    /// Steps through each scheduled slope change in `(last.ts, to]`, recording
    /// a sample at every boundary crossed, then decays the remainder of the way.
    /// Returns the curve state at `to`; the caller decides whether to record it.
    pub fn forward_fill(&mut self, to: Timestamp) -> Result<Point, CheckpointError> {
        let mut last = match self.global.last() {
            Some(p) => *p,
            None => Point { permanent: self.permanent_total, ..Point::zero(to) },
        };
        if last.ts > to {
            return Err(CheckpointError::OutOfOrder { last: last.ts, ts: to });
        }

        let mut crossed = 0usize;
        for (boundary, dslope) in self.schedule.range(last.ts.saturating_add(1)..=to) {
            last.bias = decay(last.bias, last.slope, boundary - last.ts)?;
            last.slope = last.slope.checked_add(dslope).ok_or(MathError::ArithmeticOverflow)?.max(0);
            last.ts = boundary;
            self.global.record(last)?;
            crossed += 1;
        }
        last.bias = decay(last.bias, last.slope, to - last.ts)?;
        last.ts = to;

        if crossed > 0 {
            trace!(to, crossed, "forward-filled global curve");
        }
        Ok(last)
    }

    /// Bring the global curve current and record a sample at `now`.
    pub fn checkpoint(&mut self, now: Timestamp) -> Result<(), CheckpointError> {
        let point = self.forward_fill(now)?;
        self.global.record(point)
    }

    /// Apply a change of position `id` from `old` to `new` at `now`.
    ///
    /// Pass [`LockedBalance::default()`] as `old` for a newly created position
    /// and as `new` for a destroyed one.
    pub fn checkpoint_position(
        &mut self,
        id: PositionId,
        old: &LockedBalance,
        new: &LockedBalance,
        now: Timestamp,
    ) -> Result<(), CheckpointError> {
        if let Some(last) = self.positions.get(&id).and_then(PointHistory::last) {
            if last.ts > now {
                return Err(CheckpointError::OutOfOrder { last: last.ts, ts: now });
            }
        }
        let (old_bias, old_slope) = scaled_curve(old, now)?;
        let (new_bias, new_slope) = scaled_curve(new, now)?;

        let permanent_total = self
            .permanent_total
            .checked_sub(old.permanent_amount())
            .and_then(|p| p.checked_add(new.permanent_amount()))
            .ok_or(MathError::ArithmeticOverflow)?;

        let mut global = self.forward_fill(now)?;
        global.bias = shift(global.bias, old_bias, new_bias)?;
        global.slope = shift(global.slope, old_slope, new_slope)?;
        global.permanent = permanent_total;
        self.global.record(global)?;
        self.permanent_total = permanent_total;

        // The old end's change was never applied if it is still ahead of us.
        if !old.is_permanent && old.end > now {
            self.schedule.add(old.end, old_slope)?;
        }
        if !new.is_permanent && new.end > now {
            self.schedule.add(new.end, -new_slope)?;
        }

        self.positions.entry(id).or_default().record(Point {
            bias: new_bias,
            slope: new_slope,
            ts: now,
            permanent: new.permanent_amount(),
        })?;
        trace!(id, now, new_bias, new_slope, "checkpointed position");
        Ok(())
    }

    /// Aggregate voting power at `t`. Zero before the first sample.
    ///
    /// Timestamps past the last sample are projected through the schedule.
    pub fn total_supply_at(&self, t: Timestamp) -> Result<u128, MathError> {
        let Some(p) = self.global.point_at(t) else {
            return Ok(0);
        };
        let (mut bias, mut slope, mut ts) = (p.bias, p.slope, p.ts);
        for (boundary, dslope) in self.schedule.range(ts.saturating_add(1)..=t) {
            bias = decay(bias, slope, boundary - ts)?;
            slope = slope.checked_add(dslope).ok_or(MathError::ArithmeticOverflow)?.max(0);
            ts = boundary;
        }
        bias = decay(bias, slope, t - ts)?;
        unscale(bias, p.permanent)
    }

    /// Voting power of position `id` at `t`. Zero before it existed.
    pub fn balance_of_at(&self, id: PositionId, t: Timestamp) -> Result<u128, MathError> {
        match self.positions.get(&id) {
            Some(history) => history.value_at(t),
            None => Ok(0),
        }
    }

    /// Number of samples on the global curve.
    pub fn global_epoch(&self) -> usize {
        self.global.epoch()
    }

    /// Number of samples recorded for position `id`.
    pub fn position_epoch(&self, id: PositionId) -> usize {
        self.positions.get(&id).map_or(0, PointHistory::epoch)
    }

    /// Global sample at index `idx`.
    pub fn global_point(&self, idx: usize) -> Option<&Point> {
        self.global.get(idx)
    }

    /// Sample `idx` of position `id`.
    pub fn position_point(&self, id: PositionId, idx: usize) -> Option<&Point> {
        self.positions.get(&id).and_then(|h| h.get(idx))
    }

    /// Full history of position `id`.
    pub fn position_history(&self, id: PositionId) -> Option<&PointHistory> {
        self.positions.get(&id)
    }

    /// Most recent global sample.
    pub fn last_global_point(&self) -> Option<&Point> {
        self.global.last()
    }

    /// Net slope change scheduled at exactly `t`.
    pub fn slope_change_at(&self, t: Timestamp) -> i128 {
        self.schedule.at(t)
    }

    /// The slope-change schedule.
    pub fn schedule(&self) -> &SlopeSchedule {
        &self.schedule
    }

    /// Balance currently held in permanent locks.
    pub fn permanent_total(&self) -> u128 {
        self.permanent_total
    }
}

/// `max(value - old + new, 0)`.
fn shift(value: i128, old: i128, new: i128) -> Result<i128, MathError> {
    value
        .checked_sub(old)
        .and_then(|v| v.checked_add(new))
        .map(|v| v.max(0))
        .ok_or(MathError::ArithmeticOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vela_core::constants::{MAX_LOCK_DURATION, UNIT, WEEK};

    const T0: Timestamp = 1_699_488_000;

    fn expected_power(amount: u128, end: Timestamp, t: Timestamp) -> u128 {
        if t >= end {
            0
        } else {
            amount * (end - t) as u128 / MAX_LOCK_DURATION as u128
        }
    }

    fn open(engine: &mut CheckpointEngine, id: PositionId, amount: u128, end: Timestamp, now: Timestamp) -> LockedBalance {
        let lock = LockedBalance::timed(amount, end, now);
        engine.checkpoint_position(id, &LockedBalance::default(), &lock, now).unwrap();
        lock
    }

    // ------------------------------------------------------------------
    // Single position
    // ------------------------------------------------------------------

    #[test]
    fn single_lock_supply_equals_balance() {
        let mut e = CheckpointEngine::new();
        let end = T0 + 10 * WEEK;
        open(&mut e, 1, 1_000 * UNIT, end, T0 + 5);

        for t in [T0 + 5, T0 + WEEK, T0 + 9 * WEEK + 3, end - 1] {
            let want = expected_power(1_000 * UNIT, end, t);
            assert_eq!(e.balance_of_at(1, t).unwrap(), want);
            assert_eq!(e.total_supply_at(t).unwrap(), want);
        }
        assert_eq!(e.total_supply_at(end).unwrap(), 0);
        assert_eq!(e.balance_of_at(1, end + WEEK).unwrap(), 0);
    }

    #[test]
    fn lock_schedules_slope_removal_at_end() {
        let mut e = CheckpointEngine::new();
        let end = T0 + 4 * WEEK;
        open(&mut e, 1, 500, end, T0);
        assert_eq!(e.slope_change_at(end), -500);
        assert_eq!(e.last_global_point().unwrap().slope, 500);

        e.checkpoint(end + 1).unwrap();
        let last = e.last_global_point().unwrap();
        assert_eq!(last.slope, 0);
        assert_eq!(last.bias, 0);
    }

    #[test]
    fn query_before_history_is_zero() {
        let mut e = CheckpointEngine::new();
        open(&mut e, 1, 500, T0 + WEEK, T0);
        assert_eq!(e.total_supply_at(T0 - 1).unwrap(), 0);
        assert_eq!(e.balance_of_at(1, T0 - 1).unwrap(), 0);
        assert_eq!(e.balance_of_at(99, T0).unwrap(), 0);
    }

    #[test]
    fn extending_moves_scheduled_change() {
        let mut e = CheckpointEngine::new();
        let old = open(&mut e, 1, 700, T0 + 10 * WEEK, T0);
        let new = LockedBalance { end: T0 + 20 * WEEK, ..old };
        e.checkpoint_position(1, &old, &new, T0 + WEEK).unwrap();

        assert_eq!(e.slope_change_at(T0 + 10 * WEEK), 0);
        assert_eq!(e.slope_change_at(T0 + 20 * WEEK), -700);
        assert_eq!(e.schedule().len(), 1);
        let t = T0 + 15 * WEEK;
        assert_eq!(e.total_supply_at(t).unwrap(), expected_power(700, T0 + 20 * WEEK, t));
    }

    #[test]
    fn burn_removes_contribution() {
        let mut e = CheckpointEngine::new();
        let lock = open(&mut e, 1, 700, T0 + 10 * WEEK, T0);
        e.checkpoint_position(1, &lock, &LockedBalance::default(), T0 + WEEK).unwrap();
        assert_eq!(e.total_supply_at(T0 + WEEK).unwrap(), 0);
        assert_eq!(e.balance_of_at(1, T0 + WEEK).unwrap(), 0);
        assert!(e.schedule().is_empty());
        // History before the burn is untouched.
        assert_eq!(e.balance_of_at(1, T0).unwrap(), expected_power(700, T0 + 10 * WEEK, T0));
    }

    // ------------------------------------------------------------------
    // Permanent locks
    // ------------------------------------------------------------------

    #[test]
    fn going_permanent_freezes_power() {
        let mut e = CheckpointEngine::new();
        let lock = open(&mut e, 1, 900, T0 + 10 * WEEK, T0);
        let perm = LockedBalance::permanent(900, T0);
        e.checkpoint_position(1, &lock, &perm, T0 + WEEK).unwrap();

        assert_eq!(e.permanent_total(), 900);
        assert!(e.schedule().is_empty());
        assert_eq!(e.total_supply_at(T0 + 100 * WEEK).unwrap(), 900);
        assert_eq!(e.balance_of_at(1, T0 + 100 * WEEK).unwrap(), 900);
        // Still decaying before the toggle.
        assert_eq!(e.total_supply_at(T0).unwrap(), expected_power(900, T0 + 10 * WEEK, T0));
    }

    #[test]
    fn permanent_and_timed_sum() {
        let mut e = CheckpointEngine::new();
        e.checkpoint_position(1, &LockedBalance::default(), &LockedBalance::permanent(190, T0), T0)
            .unwrap();
        open(&mut e, 2, 1_000, T0 + 8 * WEEK, T0);
        let t = T0 + 3 * WEEK;
        assert_eq!(e.total_supply_at(t).unwrap(), 190 + expected_power(1_000, T0 + 8 * WEEK, t));
        assert_eq!(e.total_supply_at(T0 + 9 * WEEK).unwrap(), 190);
    }

    // ------------------------------------------------------------------
    // Forward fill and ordering
    // ------------------------------------------------------------------

    #[test]
    fn forward_fill_records_each_boundary() {
        let mut e = CheckpointEngine::new();
        open(&mut e, 1, 100, T0 + WEEK, T0);
        open(&mut e, 2, 100, T0 + 2 * WEEK, T0);
        open(&mut e, 3, 100, T0 + 3 * WEEK, T0);
        assert_eq!(e.global_epoch(), 1);

        e.checkpoint(T0 + 3 * WEEK + 10).unwrap();
        // Three boundaries plus the final sample.
        assert_eq!(e.global_epoch(), 4);
        assert_eq!(e.global_point(1).unwrap().ts, T0 + WEEK);
        assert_eq!(e.global_point(1).unwrap().slope, 200);
        assert_eq!(e.last_global_point().unwrap().slope, 0);
    }

    #[test]
    fn repeated_checkpoint_same_time_is_idempotent() {
        let mut e = CheckpointEngine::new();
        open(&mut e, 1, 100, T0 + WEEK, T0);
        e.checkpoint(T0 + 10).unwrap();
        let epoch = e.global_epoch();
        e.checkpoint(T0 + 10).unwrap();
        assert_eq!(e.global_epoch(), epoch);
    }

    #[test]
    fn same_time_mutations_share_one_sample() {
        let mut e = CheckpointEngine::new();
        open(&mut e, 1, 100, T0 + WEEK, T0);
        open(&mut e, 2, 300, T0 + WEEK, T0);
        assert_eq!(e.global_epoch(), 1);
        assert_eq!(e.slope_change_at(T0 + WEEK), -400);
    }

    #[test]
    fn clock_regression_rejected() {
        let mut e = CheckpointEngine::new();
        open(&mut e, 1, 100, T0 + WEEK, T0 + 50);
        assert_eq!(
            e.checkpoint(T0 + 49),
            Err(CheckpointError::OutOfOrder { last: T0 + 50, ts: T0 + 49 })
        );
    }

    #[test]
    fn history_is_immutable() {
        let mut e = CheckpointEngine::new();
        open(&mut e, 1, 1_000, T0 + 30 * WEEK, T0);
        let probe = T0 + 2 * WEEK + 17;
        e.checkpoint(probe + 5).unwrap();
        let before = (e.total_supply_at(probe).unwrap(), e.balance_of_at(1, probe).unwrap());

        open(&mut e, 2, 5_000, T0 + 40 * WEEK, T0 + 6 * WEEK);
        let lock = LockedBalance::timed(1_000, T0 + 30 * WEEK, T0);
        e.checkpoint_position(1, &lock, &LockedBalance::permanent(1_000, T0), T0 + 7 * WEEK).unwrap();

        let after = (e.total_supply_at(probe).unwrap(), e.balance_of_at(1, probe).unwrap());
        assert_eq!(before, after);
    }

    #[test]
    fn snapshot_roundtrip_preserves_queries() {
        let mut e = CheckpointEngine::new();
        open(&mut e, 1, 1_000, T0 + 30 * WEEK, T0);
        open(&mut e, 2, 7_000, T0 + 12 * WEEK, T0 + WEEK);
        let bytes = bincode::serde::encode_to_vec(&e, bincode::config::standard()).unwrap();
        let (restored, _): (CheckpointEngine, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert_eq!(restored, e);
        assert_eq!(
            restored.total_supply_at(T0 + 5 * WEEK).unwrap(),
            e.total_supply_at(T0 + 5 * WEEK).unwrap()
        );
    }

    proptest! {
        #[test]
        fn supply_bounds_sum_of_balances(
            locks in prop::collection::vec((1u128..=1_000_000 * UNIT, 1u64..=52, 0u64..=6), 1..12),
            probe_weeks in 0u64..=60,
            probe_offset in 0u64..WEEK,
        ) {
            let mut e = CheckpointEngine::new();
            let mut now = T0;
            for (i, (amount, weeks, delay_days)) in locks.iter().enumerate() {
                now += delay_days * 86_400;
                let end = vela_core::epoch::epoch_start(now + weeks * WEEK);
                if end <= now {
                    continue;
                }
                open(&mut e, i as u64 + 1, *amount, end, now);
            }
            let t = now + probe_weeks * WEEK + probe_offset;
            let supply = e.total_supply_at(t).unwrap();
            let sum: u128 = (1..=locks.len() as u64).map(|id| e.balance_of_at(id, t).unwrap()).sum();
            prop_assert!(sum <= supply);
            prop_assert!(supply <= sum + locks.len() as u128);

            // Filling the curve forward must not change the projected answer.
            e.checkpoint(t).unwrap();
            prop_assert_eq!(e.total_supply_at(t).unwrap(), supply);
        }
    }
}
