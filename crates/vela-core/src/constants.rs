//! Protocol constants. All token amounts in base units (1 token = 10^18 units).

/// One whole token in base units.
pub const UNIT: u128 = 1_000_000_000_000_000_000;

/// Seconds in a day.
pub const DAY: u64 = 86_400;

/// Seconds in a week.
pub const WEEK: u64 = 7 * DAY;

/// Length of one reward/curve epoch. Lock ends and slope changes are aligned
/// to multiples of this value.
pub const EPOCH_LENGTH: u64 = WEEK;

/// Longest lock a position may carry. Full voting power equals the locked
/// amount only when the remaining time equals this value.
pub const MAX_LOCK_DURATION: u64 = 365 * DAY;

/// [`MAX_LOCK_DURATION`] as a signed value, for curve arithmetic.
pub const MAX_LOCK_DURATION_I128: i128 = MAX_LOCK_DURATION as i128;

/// Default shortest lock, measured after rounding the end down to an epoch boundary.
pub const DEFAULT_MIN_LOCK_DURATION: u64 = WEEK;

/// Default smallest amount accepted when opening a lock.
pub const DEFAULT_MIN_LOCK_AMOUNT: u128 = 1;

/// Basis-point denominator (10 000 BPS = 100 %).
pub const BPS_PRECISION: u64 = 10_000;

/// Default early-exit penalty rate applied to a lock with its full duration
/// still remaining, in basis points.
pub const DEFAULT_MAX_PENALTY_BPS: u64 = 5_000;

/// Fixed-point scale of the per-position reward remainder accumulator.
/// One whole base unit of reward equals `REMAINDER_SCALE` in the accumulator.
pub const REMAINDER_SCALE: u128 = 1_000_000_000_000_000_000;
