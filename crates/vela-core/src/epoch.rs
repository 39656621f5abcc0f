//! Epoch arithmetic.
//!
//! Time is divided into fixed epochs of [`EPOCH_LENGTH`] seconds starting at
//! the Unix epoch. Reward notifications, lock ends and scheduled slope changes
//! all land on epoch boundaries.

use crate::constants::EPOCH_LENGTH;
use crate::types::Timestamp;

/// The largest epoch boundary `<= t`.
///
/// # Examples
///
/// ```
/// use vela_core::constants::WEEK;
/// use vela_core::epoch::epoch_start;
/// assert_eq!(epoch_start(WEEK * 3), WEEK * 3);
/// assert_eq!(epoch_start(WEEK * 3 + 1), WEEK * 3);
/// assert_eq!(epoch_start(WEEK * 4 - 1), WEEK * 3);
/// ```
pub fn epoch_start(t: Timestamp) -> Timestamp {
    t - t % EPOCH_LENGTH
}

/// The smallest epoch boundary strictly greater than `t`.
///
/// A timestamp already on a boundary maps to the following boundary, so a
/// reward notified exactly at a boundary is credited to the next epoch.
///
/// # Examples
///
/// ```
/// use vela_core::constants::WEEK;
/// use vela_core::epoch::epoch_next;
/// assert_eq!(epoch_next(WEEK * 3), WEEK * 4);
/// assert_eq!(epoch_next(WEEK * 3 + 1), WEEK * 4);
/// ```
pub fn epoch_next(t: Timestamp) -> Timestamp {
    epoch_start(t).saturating_add(EPOCH_LENGTH)
}

/// Zero-based index of the epoch containing `t`.
pub fn epoch_index(t: Timestamp) -> u64 {
    t / EPOCH_LENGTH
}

/// Whether `t` sits exactly on an epoch boundary.
pub fn is_epoch_boundary(t: Timestamp) -> bool {
    t % EPOCH_LENGTH == 0
}

/// Iterate epoch boundaries from `first` to `last` inclusive.
///
/// `first` must already be a boundary. Yields nothing when `first > last`.
pub fn boundaries(first: Timestamp, last: Timestamp) -> impl Iterator<Item = Timestamp> {
    debug_assert!(is_epoch_boundary(first));
    std::iter::successors(Some(first), |t| t.checked_add(EPOCH_LENGTH))
        .take_while(move |t| *t <= last)
}
