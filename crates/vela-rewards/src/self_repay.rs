//! Self-repay redirection registry.
//!
//! Maps a position to the receiver that collects its reward payouts, with a
//! reverse index for paginated enumeration. A receiver disappears from the
//! index as soon as its last position is cleared.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use vela_core::types::{Address, PositionId};

/// Position → receiver redirects plus the receiver → positions index.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SelfRepayRegistry {
    receivers: BTreeMap<PositionId, Address>,
    by_receiver: BTreeMap<Address, BTreeSet<PositionId>>,
}

impl SelfRepayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redirect `id` to `receiver`, replacing any earlier redirect.
    pub fn set(&mut self, id: PositionId, receiver: Address) -> Option<Address> {
        let previous = self.clear(id);
        self.receivers.insert(id, receiver);
        self.by_receiver.entry(receiver).or_default().insert(id);
        previous
    }

    /// Remove the redirect of `id`, returning the old receiver.
    pub fn clear(&mut self, id: PositionId) -> Option<Address> {
        let receiver = self.receivers.remove(&id)?;
        if let Some(ids) = self.by_receiver.get_mut(&receiver) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_receiver.remove(&receiver);
            }
        }
        Some(receiver)
    }

    /// Receiver of `id`, if redirected.
    pub fn receiver_of(&self, id: PositionId) -> Option<Address> {
        self.receivers.get(&id).copied()
    }

    /// Number of redirected positions.
    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }

    /// Number of receivers with at least one position.
    pub fn receiver_count(&self) -> usize {
        self.by_receiver.len()
    }

    /// Redirected positions in id order, `limit` at most, skipping `offset`.
    pub fn positions(&self, offset: usize, limit: usize) -> Vec<(PositionId, Address)> {
        self.receivers.iter().skip(offset).take(limit).map(|(id, r)| (*id, *r)).collect()
    }

    /// Receivers in address order, paginated.
    pub fn receivers(&self, offset: usize, limit: usize) -> Vec<Address> {
        self.by_receiver.keys().skip(offset).take(limit).copied().collect()
    }

    /// Positions redirected to `receiver`, paginated.
    pub fn positions_of(&self, receiver: Address, offset: usize, limit: usize) -> Vec<PositionId> {
        self.by_receiver
            .get(&receiver)
            .map(|ids| ids.iter().skip(offset).take(limit).copied().collect())
            .unwrap_or_default()
    }
}
