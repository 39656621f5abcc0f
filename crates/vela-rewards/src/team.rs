//! Two-phase team role handoff.
//!
//! The current team proposes a successor, the successor accepts. The team
//! may cancel a pending proposal. No single call can hand the role to an
//! address that has not proven it can act.

use serde::{Deserialize, Serialize};

use vela_core::error::RewardError;
use vela_core::types::Address;

/// Privileged team address with an optional pending successor.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TeamRole {
    current: Address,
    pending: Option<Address>,
}

impl TeamRole {
    /// Start with `team` in charge and nothing pending.
    pub fn new(team: Address) -> Result<Self, RewardError> {
        if team.is_zero() {
            return Err(RewardError::ZeroAddress);
        }
        Ok(Self { current: team, pending: None })
    }

    pub fn current(&self) -> Address {
        self.current
    }

    pub fn pending(&self) -> Option<Address> {
        self.pending
    }

    /// Fail unless `caller` is the current team.
    pub fn ensure(&self, caller: Address) -> Result<(), RewardError> {
        if caller != self.current {
            return Err(RewardError::NotTeam(caller));
        }
        Ok(())
    }

    /// Nominate `next` as successor. Replaces any earlier nomination.
    pub fn propose(&mut self, caller: Address, next: Address) -> Result<(), RewardError> {
        self.ensure(caller)?;
        if next.is_zero() {
            return Err(RewardError::ZeroAddress);
        }
        if next == self.current {
            return Err(RewardError::SameTeam);
        }
        self.pending = Some(next);
        Ok(())
    }

    /// Complete the handoff. Only the nominee may call.
    pub fn accept(&mut self, caller: Address) -> Result<Address, RewardError> {
        let pending = self.pending.ok_or(RewardError::NoPendingTeam)?;
        if caller != pending {
            return Err(RewardError::NotPendingTeam(caller));
        }
        let previous = self.current;
        self.current = pending;
        self.pending = None;
        Ok(previous)
    }

    /// Withdraw the pending nomination.
    pub fn cancel(&mut self, caller: Address) -> Result<Address, RewardError> {
        self.ensure(caller)?;
        self.pending.take().ok_or(RewardError::NoPendingTeam)
    }
}
