//! Append-only point history with binary-search lookup.

use serde::{Deserialize, Serialize};

use vela_core::error::{CheckpointError, MathError};
use vela_core::types::Timestamp;

use crate::point::Point;

/// Time-ordered samples of one curve.
///
/// Timestamps are non-decreasing. Recording twice at the same timestamp
/// replaces the last sample instead of appending, so the epoch counter only
/// advances once per timestamp.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PointHistory {
    points: Vec<Point>,
}

impl PointHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `point`, replacing the last sample if it has the same timestamp.
    pub fn record(&mut self, point: Point) -> Result<(), CheckpointError> {
        match self.points.last_mut() {
            Some(last) if last.ts > point.ts => {
                Err(CheckpointError::OutOfOrder { last: last.ts, ts: point.ts })
            }
            Some(last) if last.ts == point.ts => {
                *last = point;
                Ok(())
            }
            _ => {
                self.points.push(point);
                Ok(())
            }
        }
    }

    /// Most recent sample.
    pub fn last(&self) -> Option<&Point> {
        self.points.last()
    }

    /// Number of samples recorded (the entity's epoch counter).
    pub fn epoch(&self) -> usize {
        self.points.len()
    }

    /// Sample at index `idx`.
    pub fn get(&self, idx: usize) -> Option<&Point> {
        self.points.get(idx)
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Latest sample with `ts <= t`, or `None` if `t` precedes the history.
    pub fn point_at(&self, t: Timestamp) -> Option<&Point> {
        let idx = self.points.partition_point(|p| p.ts <= t);
        idx.checked_sub(1).map(|i| &self.points[i])
    }

    /// Voting power at `t`. Zero before the first sample.
    pub fn value_at(&self, t: Timestamp) -> Result<u128, MathError> {
        match self.point_at(t) {
            Some(p) => p.value_at(t),
            None => Ok(0),
        }
    }

    /// Iterate all samples in time order.
    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }
}
