//! Sparse schedule of future slope changes.
//!
//! Keyed by epoch-aligned lock end. An ordered map lets forward fill visit
//! only the boundaries between two timestamps via a range query.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use vela_core::error::MathError;
use vela_core::types::Timestamp;

/// Net slope change applied to the global curve when it crosses each key.
///
/// Entries that net out to zero are removed.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SlopeSchedule {
    changes: BTreeMap<Timestamp, i128>,
}

impl SlopeSchedule {
    /// Create an empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to the change scheduled at `t`.
    pub fn add(&mut self, t: Timestamp, delta: i128) -> Result<(), MathError> {
        if delta == 0 {
            return Ok(());
        }
        let current = self.at(t);
        let next = current.checked_add(delta).ok_or(MathError::ArithmeticOverflow)?;
        if next == 0 {
            self.changes.remove(&t);
        } else {
            self.changes.insert(t, next);
        }
        Ok(())
    }

    /// Change scheduled at exactly `t`, zero if none.
    pub fn at(&self, t: Timestamp) -> i128 {
        self.changes.get(&t).copied().unwrap_or(0)
    }

    /// Scheduled changes with keys in `range`, in time order. Empty when the
    /// range is reversed.
    pub fn range(&self, range: RangeInclusive<Timestamp>) -> impl Iterator<Item = (Timestamp, i128)> + '_ {
        let (start, end) = range.into_inner();
        (start <= end)
            .then(|| self.changes.range(start..=end))
            .into_iter()
            .flatten()
            .map(|(t, d)| (*t, *d))
    }

    /// Number of timestamps with a pending change.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether no change is scheduled.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
