//! Trait interfaces for the Vela protocol.
//!
//! These traits define the contracts between crates:
//! - [`TokenLedger`] : fungible token custody (in-memory impl in [`crate::ledger`])
//! - [`PositionRegistry`] : position ownership and approvals (vela-escrow implements)
//! - [`VotingPowerSource`] : historical voting power queries (vela-escrow implements)
//! - [`DecayCalculator`] : voting power and penalty math (vela-decay implements)
//! - [`PositionHooks`] : lifecycle notifications that settle rewards (vela-rewards implements)

use crate::error::{LedgerError, LockError, MathError, RewardError};
use crate::types::{Address, LockedBalance, PositionId, Timestamp};

/// Fungible token movements between accounts.
///
/// Implementations must fail loudly: a transfer either moves the full amount
/// or returns an error and leaves balances untouched.
pub trait TokenLedger {
    /// Move `amount` of `token` from `from` to `to`.
    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), LedgerError>;

    /// Current balance of `account` in `token`.
    fn balance_of(&self, token: Address, account: Address) -> u128;
}

/// Ownership bookkeeping for lock positions (non-fungible semantics).
pub trait PositionRegistry {
    /// Current owner, or `None` if the position does not exist.
    fn owner_of(&self, id: PositionId) -> Option<Address>;

    /// Whether `spender` is the owner, the approved address, or an operator of the owner.
    fn is_approved_or_owner(&self, spender: Address, id: PositionId) -> bool;

    /// Create position `id` owned by `to`.
    fn mint(&mut self, to: Address, id: PositionId) -> Result<(), LockError>;

    /// Destroy position `id`.
    fn burn(&mut self, id: PositionId) -> Result<(), LockError>;

    /// Hand position `id` to `to`, clearing its single-position approval.
    fn transfer(&mut self, id: PositionId, to: Address) -> Result<(), LockError>;
}

/// Read-only view of voting power history consumed by the reward engine.
pub trait VotingPowerSource {
    /// Voting power of position `id` at timestamp `t`. Zero before the position existed.
    fn balance_of_at(&self, id: PositionId, t: Timestamp) -> Result<u128, MathError>;

    /// Aggregate voting power at timestamp `t`, including permanent locks.
    fn total_supply_at(&self, t: Timestamp) -> Result<u128, MathError>;

    /// Current owner, or `None` if the position does not exist.
    fn owner_of(&self, id: PositionId) -> Option<Address>;

    /// Whether `spender` may act for position `id`.
    fn is_approved_or_owner(&self, spender: Address, id: PositionId) -> bool;
}

/// Pure computation of voting power and early-exit penalties.
///
/// All math uses integer arithmetic, multiplying before dividing.
pub trait DecayCalculator {
    /// Instantaneous voting power of `lock` at `now`.
    ///
    /// Permanent locks return `amount`; expired timed locks return zero;
    /// otherwise `amount * (end - now) / MAX_LOCK_DURATION`.
    fn voting_power(&self, lock: &LockedBalance, now: Timestamp) -> Result<u128, MathError>;

    /// Penalty charged for exiting `lock` at `now`, given the rate that applies
    /// with the whole lock remaining.
    fn early_exit_penalty(
        &self,
        lock: &LockedBalance,
        now: Timestamp,
        max_penalty_bps: u64,
    ) -> Result<u128, MathError>;

    /// Effective start after adding `added` to `lock` at `now`.
    fn effective_start_after_deposit(
        &self,
        lock: &LockedBalance,
        added: u128,
        now: Timestamp,
    ) -> Result<Timestamp, MathError>;

    /// Effective start of the lock produced by merging `a` and `b`.
    fn merged_effective_start(
        &self,
        a: &LockedBalance,
        b: &LockedBalance,
    ) -> Result<Timestamp, MathError>;
}

/// Lifecycle notifications raised by the lock ledger.
///
/// The `before` hooks run while the outgoing owner is still the owner of
/// record, so pending rewards are realized to them.
pub trait PositionHooks {
    /// Position `id` came into existence at `now`.
    fn on_minted(&mut self, id: PositionId, now: Timestamp) -> Result<(), RewardError>;

    /// Position `id` is about to leave `from`.
    fn on_before_transfer(
        &mut self,
        source: &dyn VotingPowerSource,
        ledger: &mut dyn TokenLedger,
        id: PositionId,
        from: Address,
        now: Timestamp,
    ) -> Result<(), RewardError>;

    /// Position `id`, owned by `from`, is about to be destroyed.
    fn on_before_burn(
        &mut self,
        source: &dyn VotingPowerSource,
        ledger: &mut dyn TokenLedger,
        id: PositionId,
        from: Address,
        now: Timestamp,
    ) -> Result<(), RewardError>;

    /// Position `from` was merged into `to`.
    fn on_after_merge(
        &mut self,
        from: PositionId,
        to: PositionId,
        owner: Address,
        now: Timestamp,
    ) -> Result<(), RewardError>;

    /// Position `from` was split into `first` (holding `first_amount`) and
    /// `second` (holding `second_amount`).
    #[allow(clippy::too_many_arguments)]
    fn on_after_split(
        &mut self,
        from: PositionId,
        first: PositionId,
        first_amount: u128,
        second: PositionId,
        second_amount: u128,
        owner: Address,
        now: Timestamp,
    ) -> Result<(), RewardError>;
}

/// Hooks that ignore every notification. Used when no reward engine is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl PositionHooks for NoopHooks {
    fn on_minted(&mut self, _id: PositionId, _now: Timestamp) -> Result<(), RewardError> {
        Ok(())
    }

    fn on_before_transfer(
        &mut self,
        _source: &dyn VotingPowerSource,
        _ledger: &mut dyn TokenLedger,
        _id: PositionId,
        _from: Address,
        _now: Timestamp,
    ) -> Result<(), RewardError> {
        Ok(())
    }

    fn on_before_burn(
        &mut self,
        _source: &dyn VotingPowerSource,
        _ledger: &mut dyn TokenLedger,
        _id: PositionId,
        _from: Address,
        _now: Timestamp,
    ) -> Result<(), RewardError> {
        Ok(())
    }

    fn on_after_merge(
        &mut self,
        _from: PositionId,
        _to: PositionId,
        _owner: Address,
        _now: Timestamp,
    ) -> Result<(), RewardError> {
        Ok(())
    }

    fn on_after_split(
        &mut self,
        _from: PositionId,
        _first: PositionId,
        _first_amount: u128,
        _second: PositionId,
        _second_amount: u128,
        _owner: Address,
        _now: Timestamp,
    ) -> Result<(), RewardError> {
        Ok(())
    }
}
