//! The lock ledger.
//!
//! [`VotingEscrow`] owns every lock record, the checkpoint engine and the
//! custody balance. Each mutating operation validates its inputs against the
//! current state first, then moves tokens, updates the registry, records
//! checkpoints and finally notifies hooks.
//!
//! Operations that reach an external collaborator run under the
//! [`ReentrancyGuard`]. Ownership-changing operations call the `before`
//! hook while the outgoing owner is still on record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use vela_checkpoint::CheckpointEngine;
use vela_core::config::EscrowConfig;
use vela_core::constants::MAX_LOCK_DURATION;
use vela_core::epoch::epoch_start;
use vela_core::error::{ConfigError, LockError, MathError};
use vela_core::guard::ReentrancyGuard;
use vela_core::traits::{
    DecayCalculator, PositionHooks, PositionRegistry, TokenLedger, VotingPowerSource,
};
use vela_core::types::{Address, LockedBalance, PositionId, Timestamp};
use vela_decay::DecayEngine;

use crate::registry::MemoryPositionRegistry;

/// Result of closing a position.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Withdrawal {
    /// Owner of record when the position was burned; receives `amount`.
    pub owner: Address,
    /// Paid to the owner.
    pub amount: u128,
    /// Paid to the treasury.
    pub penalty: u128,
}

/// Vote-escrow lock ledger.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct VotingEscrow<R = MemoryPositionRegistry> {
    config: EscrowConfig,
    /// The locked token.
    token: Address,
    /// Custody account holding every locked token.
    account: Address,
    /// Receives early-exit penalties.
    treasury: Address,
    registry: R,
    locks: HashMap<PositionId, LockedBalance>,
    checkpoints: CheckpointEngine,
    next_id: PositionId,
    /// Sum of all locked amounts.
    supply: u128,
    guard: ReentrancyGuard,
    #[serde(skip)]
    decay: DecayEngine,
}

impl VotingEscrow<MemoryPositionRegistry> {
    /// Create a ledger backed by an in-memory registry.
    pub fn new(
        config: EscrowConfig,
        token: Address,
        account: Address,
        treasury: Address,
    ) -> Result<Self, ConfigError> {
        Self::with_registry(config, token, account, treasury, MemoryPositionRegistry::new())
    }

    /// Approve `spender` for position `id` (zero address clears).
    pub fn approve(&mut self, caller: Address, spender: Address, id: PositionId) -> Result<(), LockError> {
        self.registry.approve(caller, spender, id)?;
        debug!(id, %spender, "position approval set");
        Ok(())
    }

    /// Allow or revoke `operator` for every position of `caller`.
    pub fn set_approval_for_all(
        &mut self,
        caller: Address,
        operator: Address,
        approved: bool,
    ) -> Result<(), LockError> {
        self.registry.set_approval_for_all(caller, operator, approved)?;
        debug!(owner = %caller, %operator, approved, "operator approval set");
        Ok(())
    }
}

impl<R: PositionRegistry> VotingEscrow<R> {
    /// Create a ledger over an arbitrary ownership registry.
    pub fn with_registry(
        config: EscrowConfig,
        token: Address,
        account: Address,
        treasury: Address,
        registry: R,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        for (name, addr) in [("token", token), ("custody account", account), ("treasury", treasury)] {
            if addr.is_zero() {
                return Err(ConfigError::ZeroAddress(name));
            }
        }
        Ok(Self {
            config,
            token,
            account,
            treasury,
            registry,
            locks: HashMap::new(),
            checkpoints: CheckpointEngine::new(),
            next_id: 1,
            supply: 0,
            guard: ReentrancyGuard::new(),
            decay: DecayEngine::new(),
        })
    }

    // ------------------------------------------------------------------
    // Opening locks
    // ------------------------------------------------------------------

    /// Lock `amount` from `caller` until `now + duration` (rounded down to an
    /// epoch boundary) and mint the position to `recipient`.
    #[allow(clippy::too_many_arguments)]
    pub fn create_lock(
        &mut self,
        caller: Address,
        amount: u128,
        duration: u64,
        recipient: Address,
        now: Timestamp,
        ledger: &mut dyn TokenLedger,
        hooks: &mut dyn PositionHooks,
    ) -> Result<PositionId, LockError> {
        self.validate_amount(amount)?;
        let end = self.end_for(now, duration)?;
        self.open(caller, LockedBalance::timed(amount, end, now), recipient, now, ledger, hooks)
    }

    /// Lock `amount` permanently. `duration` is validated like a timed lock
    /// but does not set an end.
    #[allow(clippy::too_many_arguments)]
    pub fn create_permanent_lock(
        &mut self,
        caller: Address,
        amount: u128,
        duration: u64,
        recipient: Address,
        now: Timestamp,
        ledger: &mut dyn TokenLedger,
        hooks: &mut dyn PositionHooks,
    ) -> Result<PositionId, LockError> {
        self.validate_amount(amount)?;
        self.end_for(now, duration)?;
        self.open(caller, LockedBalance::permanent(amount, now), recipient, now, ledger, hooks)
    }

    fn open(
        &mut self,
        caller: Address,
        lock: LockedBalance,
        recipient: Address,
        now: Timestamp,
        ledger: &mut dyn TokenLedger,
        hooks: &mut dyn PositionHooks,
    ) -> Result<PositionId, LockError> {
        if recipient.is_zero() {
            return Err(LockError::ZeroAddress);
        }
        self.non_reentrant(|this| {
            this.pull(ledger, caller, lock.amount)?;
            let id = this.allocate_id()?;
            this.registry.mint(recipient, id)?;
            this.apply(id, LockedBalance::default(), lock, now)?;
            hooks.on_minted(id, now)?;
            info!(
                id,
                owner = %recipient,
                amount = lock.amount,
                end = lock.end,
                permanent = lock.is_permanent,
                "lock opened"
            );
            Ok(id)
        })
    }

    // ------------------------------------------------------------------
    // Top-ups and extension
    // ------------------------------------------------------------------

    /// Add `amount` from `caller` to position `id`. Owner or approved only.
    pub fn increase_amount(
        &mut self,
        caller: Address,
        id: PositionId,
        amount: u128,
        now: Timestamp,
        ledger: &mut dyn TokenLedger,
    ) -> Result<(), LockError> {
        self.require_approved(caller, id)?;
        self.deposit(caller, id, amount, now, ledger)
    }

    /// Add `amount` from `caller` to someone else's position `id`.
    pub fn deposit_for(
        &mut self,
        caller: Address,
        id: PositionId,
        amount: u128,
        now: Timestamp,
        ledger: &mut dyn TokenLedger,
    ) -> Result<(), LockError> {
        self.deposit(caller, id, amount, now, ledger)
    }

    fn deposit(
        &mut self,
        caller: Address,
        id: PositionId,
        amount: u128,
        now: Timestamp,
        ledger: &mut dyn TokenLedger,
    ) -> Result<(), LockError> {
        let old = self.lock_of(id)?;
        if amount == 0 {
            return Err(LockError::ZeroAmount);
        }
        if old.is_expired(now) {
            return Err(LockError::LockExpired(id));
        }
        let effective_start = self.decay.effective_start_after_deposit(&old, amount, now)?;
        let new = LockedBalance {
            amount: old.amount.checked_add(amount).ok_or(MathError::ArithmeticOverflow)?,
            effective_start,
            ..old
        };
        self.non_reentrant(|this| {
            this.pull(ledger, caller, amount)?;
            this.apply(id, old, new, now)?;
            info!(id, amount, total = new.amount, effective_start, "lock topped up");
            Ok(())
        })
    }

    /// Move the end of position `id` to `now + duration` rounded down.
    ///
    /// The effective start is left untouched.
    pub fn increase_unlock_time(
        &mut self,
        caller: Address,
        id: PositionId,
        duration: u64,
        now: Timestamp,
    ) -> Result<(), LockError> {
        self.require_approved(caller, id)?;
        let old = self.lock_of(id)?;
        if old.is_permanent {
            return Err(LockError::PermanentLock(id));
        }
        if old.is_expired(now) {
            return Err(LockError::LockExpired(id));
        }
        let end = epoch_start(now.checked_add(duration).ok_or(MathError::ArithmeticOverflow)?);
        if end < old.end {
            return Err(LockError::UnlockTimeDecreased { current: old.end, requested: end });
        }
        if end - now > MAX_LOCK_DURATION {
            return Err(LockError::DurationTooLong { duration: end - now, max: MAX_LOCK_DURATION });
        }
        let new = LockedBalance { end, ..old };
        self.apply(id, old, new, now)?;
        info!(id, old_end = old.end, new_end = end, "lock extended");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Closing locks
    // ------------------------------------------------------------------

    /// Withdraw an expired timed lock in full to its owner.
    pub fn withdraw(
        &mut self,
        caller: Address,
        id: PositionId,
        now: Timestamp,
        ledger: &mut dyn TokenLedger,
        hooks: &mut dyn PositionHooks,
    ) -> Result<Withdrawal, LockError> {
        let owner = self.require_approved(caller, id)?;
        let lock = self.lock_of(id)?;
        if lock.is_permanent {
            return Err(LockError::PermanentLock(id));
        }
        if !lock.is_expired(now) {
            return Err(LockError::LockNotExpired(id));
        }
        self.close(id, owner, lock, 0, now, ledger, hooks)
    }

    /// Withdraw position `id` before its end, paying the early-exit penalty
    /// to the treasury. An expired lock pays no penalty.
    pub fn withdraw_early(
        &mut self,
        caller: Address,
        id: PositionId,
        now: Timestamp,
        ledger: &mut dyn TokenLedger,
        hooks: &mut dyn PositionHooks,
    ) -> Result<Withdrawal, LockError> {
        let owner = self.require_approved(caller, id)?;
        let lock = self.lock_of(id)?;
        let penalty = self.decay.early_exit_penalty(&lock, now, self.config.max_penalty_bps)?;
        self.close(id, owner, lock, penalty, now, ledger, hooks)
    }

    #[allow(clippy::too_many_arguments)]
    fn close(
        &mut self,
        id: PositionId,
        owner: Address,
        lock: LockedBalance,
        penalty: u128,
        now: Timestamp,
        ledger: &mut dyn TokenLedger,
        hooks: &mut dyn PositionHooks,
    ) -> Result<Withdrawal, LockError> {
        let amount = lock.amount.checked_sub(penalty).ok_or(MathError::ArithmeticOverflow)?;
        self.non_reentrant(|this| {
            hooks.on_before_burn(&*this, ledger, id, owner, now)?;
            this.apply(id, lock, LockedBalance::default(), now)?;
            this.registry.burn(id)?;
            let treasury = this.treasury;
            this.push(ledger, treasury, penalty)?;
            this.push(ledger, owner, amount)?;
            info!(id, %owner, amount, penalty, "lock withdrawn");
            Ok(Withdrawal { owner, amount, penalty })
        })
    }

    // ------------------------------------------------------------------
    // Merge and split
    // ------------------------------------------------------------------

    /// Fold position `from` into `to`. The source is burned.
    ///
    /// The result is permanent if either side is; otherwise it ends at the
    /// later end. Effective starts are averaged by amount.
    pub fn merge(
        &mut self,
        caller: Address,
        from: PositionId,
        to: PositionId,
        now: Timestamp,
        ledger: &mut dyn TokenLedger,
        hooks: &mut dyn PositionHooks,
    ) -> Result<(), LockError> {
        if from == to {
            return Err(LockError::SameLock(from));
        }
        let from_owner = self.require_approved(caller, from)?;
        let to_owner = self.require_approved(caller, to)?;
        let source = self.lock_of(from)?;
        let dest = self.lock_of(to)?;
        if dest.is_expired(now) {
            return Err(LockError::LockExpired(to));
        }
        let amount = source.amount.checked_add(dest.amount).ok_or(MathError::ArithmeticOverflow)?;
        let start = self.decay.merged_effective_start(&source, &dest)?;
        let merged = if source.is_permanent || dest.is_permanent {
            LockedBalance::permanent(amount, start)
        } else {
            LockedBalance::timed(amount, source.end.max(dest.end), start)
        };

        self.non_reentrant(|this| {
            hooks.on_before_burn(&*this, ledger, from, from_owner, now)?;
            this.apply(from, source, LockedBalance::default(), now)?;
            this.registry.burn(from)?;
            this.apply(to, dest, merged, now)?;
            hooks.on_after_merge(from, to, to_owner, now)?;
            info!(from, to, amount, end = merged.end, permanent = merged.is_permanent, "locks merged");
            Ok(())
        })
    }

    /// Burn position `id` and mint two positions holding `locked - amount`
    /// and `amount`, both with the original end and effective start.
    pub fn split(
        &mut self,
        caller: Address,
        id: PositionId,
        amount: u128,
        now: Timestamp,
        ledger: &mut dyn TokenLedger,
        hooks: &mut dyn PositionHooks,
    ) -> Result<(PositionId, PositionId), LockError> {
        let owner = self.require_approved(caller, id)?;
        let lock = self.lock_of(id)?;
        if lock.is_permanent {
            return Err(LockError::PermanentLock(id));
        }
        if lock.is_expired(now) {
            return Err(LockError::LockExpired(id));
        }
        if amount == 0 || amount >= lock.amount {
            return Err(LockError::InvalidSplitAmount { amount, locked: lock.amount });
        }
        let first_lock = LockedBalance { amount: lock.amount - amount, ..lock };
        let second_lock = LockedBalance { amount, ..lock };

        self.non_reentrant(|this| {
            hooks.on_before_burn(&*this, ledger, id, owner, now)?;
            this.apply(id, lock, LockedBalance::default(), now)?;
            this.registry.burn(id)?;

            let first = this.allocate_id()?;
            let second = this.allocate_id()?;
            this.registry.mint(owner, first)?;
            this.apply(first, LockedBalance::default(), first_lock, now)?;
            this.registry.mint(owner, second)?;
            this.apply(second, LockedBalance::default(), second_lock, now)?;

            hooks.on_minted(first, now)?;
            hooks.on_minted(second, now)?;
            hooks.on_after_split(id, first, first_lock.amount, second, amount, owner, now)?;
            info!(from = id, first, second, first_amount = first_lock.amount, second_amount = amount, "lock split");
            Ok((first, second))
        })
    }

    // ------------------------------------------------------------------
    // Permanence
    // ------------------------------------------------------------------

    /// Make position `id` permanent. Owner only.
    pub fn lock_permanent(&mut self, caller: Address, id: PositionId, now: Timestamp) -> Result<(), LockError> {
        self.require_owner(caller, id)?;
        let old = self.lock_of(id)?;
        if old.is_permanent {
            return Err(LockError::PermanentLock(id));
        }
        if old.is_expired(now) {
            return Err(LockError::LockExpired(id));
        }
        let new = LockedBalance::permanent(old.amount, old.effective_start);
        self.apply(id, old, new, now)?;
        info!(id, amount = old.amount, "lock made permanent");
        Ok(())
    }

    /// Return position `id` to a full-length timed lock starting now. Owner only.
    pub fn unlock_permanent(&mut self, caller: Address, id: PositionId, now: Timestamp) -> Result<(), LockError> {
        self.require_owner(caller, id)?;
        let old = self.lock_of(id)?;
        if !old.is_permanent {
            return Err(LockError::NotPermanentLock(id));
        }
        let end = epoch_start(now.checked_add(MAX_LOCK_DURATION).ok_or(MathError::ArithmeticOverflow)?);
        let new = LockedBalance::timed(old.amount, end, now);
        self.apply(id, old, new, now)?;
        info!(id, amount = old.amount, end, "permanent lock unwound");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Ownership
    // ------------------------------------------------------------------

    /// Transfer position `id` to `to`. Pending rewards settle to the current
    /// owner first.
    pub fn transfer(
        &mut self,
        caller: Address,
        id: PositionId,
        to: Address,
        now: Timestamp,
        ledger: &mut dyn TokenLedger,
        hooks: &mut dyn PositionHooks,
    ) -> Result<(), LockError> {
        let from = self.require_approved(caller, id)?;
        if to.is_zero() {
            return Err(LockError::ZeroAddress);
        }
        self.non_reentrant(|this| {
            hooks.on_before_transfer(&*this, ledger, id, from, now)?;
            this.registry.transfer(id, to)?;
            info!(id, %from, %to, "position transferred");
            Ok(())
        })
    }

    /// Bring the global curve current at `now`.
    pub fn checkpoint(&mut self, now: Timestamp) -> Result<(), LockError> {
        self.checkpoints.checkpoint(now)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Lock record of position `id`.
    pub fn locked(&self, id: PositionId) -> Option<LockedBalance> {
        self.locks.get(&id).copied()
    }

    /// Voting power of position `id` at `now`, from its lock record.
    pub fn voting_power(&self, id: PositionId, now: Timestamp) -> Result<u128, MathError> {
        match self.locks.get(&id) {
            Some(lock) => self.decay.voting_power(lock, now),
            None => Ok(0),
        }
    }

    /// Penalty `withdraw_early` would charge at `now`.
    pub fn early_exit_penalty(&self, id: PositionId, now: Timestamp) -> Result<u128, LockError> {
        let lock = self.lock_of(id)?;
        Ok(self.decay.early_exit_penalty(&lock, now, self.config.max_penalty_bps)?)
    }

    /// Sum of all locked amounts.
    pub fn total_locked(&self) -> u128 {
        self.supply
    }

    /// Number of live positions.
    pub fn position_count(&self) -> usize {
        self.locks.len()
    }

    /// Live position ids in ascending order.
    pub fn position_ids(&self) -> Vec<PositionId> {
        let mut ids: Vec<_> = self.locks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Id the next opened position will receive.
    pub fn next_id(&self) -> PositionId {
        self.next_id
    }

    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    pub fn token(&self) -> Address {
        self.token
    }

    /// Custody account holding locked tokens.
    pub fn account(&self) -> Address {
        self.account
    }

    pub fn treasury(&self) -> Address {
        self.treasury
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Curve histories, for historical inspection.
    pub fn checkpoints(&self) -> &CheckpointEngine {
        &self.checkpoints
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn non_reentrant<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, LockError>,
    ) -> Result<T, LockError> {
        if !self.guard.enter() {
            return Err(LockError::Reentrant);
        }
        let result = f(self);
        self.guard.exit();
        result
    }

    fn validate_amount(&self, amount: u128) -> Result<(), LockError> {
        if amount == 0 {
            return Err(LockError::ZeroAmount);
        }
        if amount < self.config.min_lock_amount {
            return Err(LockError::AmountTooSmall { amount, min: self.config.min_lock_amount });
        }
        Ok(())
    }

    /// Epoch-aligned end for a lock of `duration` opened at `now`.
    fn end_for(&self, now: Timestamp, duration: u64) -> Result<Timestamp, LockError> {
        let end = epoch_start(now.checked_add(duration).ok_or(MathError::ArithmeticOverflow)?);
        let effective = end.saturating_sub(now);
        if end <= now || effective < self.config.min_lock_duration {
            return Err(LockError::DurationTooShort { duration: effective, min: self.config.min_lock_duration });
        }
        if effective > MAX_LOCK_DURATION {
            return Err(LockError::DurationTooLong { duration: effective, max: MAX_LOCK_DURATION });
        }
        Ok(end)
    }

    fn lock_of(&self, id: PositionId) -> Result<LockedBalance, LockError> {
        self.locks.get(&id).copied().ok_or(LockError::NonexistentPosition(id))
    }

    fn require_approved(&self, caller: Address, id: PositionId) -> Result<Address, LockError> {
        let owner = self.registry.owner_of(id).ok_or(LockError::NonexistentPosition(id))?;
        if !self.registry.is_approved_or_owner(caller, id) {
            return Err(LockError::NotApprovedOrOwner { caller, id });
        }
        Ok(owner)
    }

    fn require_owner(&self, caller: Address, id: PositionId) -> Result<(), LockError> {
        let owner = self.registry.owner_of(id).ok_or(LockError::NonexistentPosition(id))?;
        if caller != owner {
            return Err(LockError::NotOwner { caller, id });
        }
        Ok(())
    }

    fn allocate_id(&mut self) -> Result<PositionId, LockError> {
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(MathError::ArithmeticOverflow)?;
        Ok(id)
    }

    /// Record the change of `id` from `old` to `new` and store the new record.
    fn apply(
        &mut self,
        id: PositionId,
        old: LockedBalance,
        new: LockedBalance,
        now: Timestamp,
    ) -> Result<(), LockError> {
        self.checkpoints.checkpoint_position(id, &old, &new, now)?;
        if new.amount == 0 {
            self.locks.remove(&id);
        } else {
            self.locks.insert(id, new);
        }
        Ok(())
    }

    fn pull(&mut self, ledger: &mut dyn TokenLedger, from: Address, amount: u128) -> Result<(), LockError> {
        let supply = self.supply.checked_add(amount).ok_or(MathError::ArithmeticOverflow)?;
        ledger.transfer(self.token, from, self.account, amount)?;
        self.supply = supply;
        Ok(())
    }

    fn push(&mut self, ledger: &mut dyn TokenLedger, to: Address, amount: u128) -> Result<(), LockError> {
        if amount == 0 {
            return Ok(());
        }
        let supply = self.supply.checked_sub(amount).ok_or(MathError::ArithmeticOverflow)?;
        ledger.transfer(self.token, self.account, to, amount)?;
        self.supply = supply;
        Ok(())
    }
}

impl<R: PositionRegistry> VotingPowerSource for VotingEscrow<R> {
    fn balance_of_at(&self, id: PositionId, t: Timestamp) -> Result<u128, MathError> {
        self.checkpoints.balance_of_at(id, t)
    }

    fn total_supply_at(&self, t: Timestamp) -> Result<u128, MathError> {
        self.checkpoints.total_supply_at(t)
    }

    fn owner_of(&self, id: PositionId) -> Option<Address> {
        self.registry.owner_of(id)
    }

    fn is_approved_or_owner(&self, spender: Address, id: PositionId) -> bool {
        self.registry.is_approved_or_owner(spender, id)
    }
}
