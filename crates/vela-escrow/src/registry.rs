//! In-memory position ownership registry.
//!
//! Standard non-fungible semantics: one owner per position, an optional
//! single-position approval that is cleared on transfer, and owner-wide
//! operators.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use vela_core::error::LockError;
use vela_core::traits::PositionRegistry;
use vela_core::types::{Address, PositionId};

/// Ownership and approvals kept in `HashMap`s.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryPositionRegistry {
    /// Position → owner.
    owners: HashMap<PositionId, Address>,
    /// Position → approved spender.
    approvals: HashMap<PositionId, Address>,
    /// `(owner, operator)` pairs allowed to act on every position of the owner.
    operators: HashSet<(Address, Address)>,
    /// Owner → number of positions held.
    balances: HashMap<Address, u64>,
}

impl MemoryPositionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Approve `spender` for position `id`. `Address::ZERO` clears the approval.
    ///
    /// The caller must be the owner or one of the owner's operators.
    pub fn approve(&mut self, caller: Address, spender: Address, id: PositionId) -> Result<(), LockError> {
        let owner = self.owners.get(&id).copied().ok_or(LockError::NonexistentPosition(id))?;
        if caller != owner && !self.is_approved_for_all(owner, caller) {
            return Err(LockError::NotApprovedOrOwner { caller, id });
        }
        if spender.is_zero() {
            self.approvals.remove(&id);
        } else {
            self.approvals.insert(id, spender);
        }
        Ok(())
    }

    /// Allow or revoke `operator` for every position of `owner`.
    pub fn set_approval_for_all(
        &mut self,
        owner: Address,
        operator: Address,
        approved: bool,
    ) -> Result<(), LockError> {
        if operator.is_zero() {
            return Err(LockError::ZeroAddress);
        }
        if approved {
            self.operators.insert((owner, operator));
        } else {
            self.operators.remove(&(owner, operator));
        }
        Ok(())
    }

    /// Approved spender of position `id`, if any.
    pub fn get_approved(&self, id: PositionId) -> Option<Address> {
        self.approvals.get(&id).copied()
    }

    /// Whether `operator` may act on every position of `owner`.
    pub fn is_approved_for_all(&self, owner: Address, operator: Address) -> bool {
        self.operators.contains(&(owner, operator))
    }

    /// Number of positions held by `owner`.
    pub fn balance_of(&self, owner: Address) -> u64 {
        self.balances.get(&owner).copied().unwrap_or(0)
    }

    /// Number of live positions.
    pub fn position_count(&self) -> usize {
        self.owners.len()
    }

    fn credit(&mut self, owner: Address) {
        *self.balances.entry(owner).or_insert(0) += 1;
    }

    fn debit(&mut self, owner: Address) {
        if let Some(count) = self.balances.get_mut(&owner) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.balances.remove(&owner);
            }
        }
    }
}

impl PositionRegistry for MemoryPositionRegistry {
    fn owner_of(&self, id: PositionId) -> Option<Address> {
        self.owners.get(&id).copied()
    }

    fn is_approved_or_owner(&self, spender: Address, id: PositionId) -> bool {
        match self.owners.get(&id) {
            Some(&owner) => {
                spender == owner
                    || self.approvals.get(&id) == Some(&spender)
                    || self.is_approved_for_all(owner, spender)
            }
            None => false,
        }
    }

    fn mint(&mut self, to: Address, id: PositionId) -> Result<(), LockError> {
        if to.is_zero() {
            return Err(LockError::ZeroAddress);
        }
        if self.owners.contains_key(&id) {
            return Err(LockError::AlreadyMinted(id));
        }
        self.owners.insert(id, to);
        self.credit(to);
        Ok(())
    }

    fn burn(&mut self, id: PositionId) -> Result<(), LockError> {
        let owner = self.owners.remove(&id).ok_or(LockError::NonexistentPosition(id))?;
        self.approvals.remove(&id);
        self.debit(owner);
        Ok(())
    }

    fn transfer(&mut self, id: PositionId, to: Address) -> Result<(), LockError> {
        if to.is_zero() {
            return Err(LockError::ZeroAddress);
        }
        let owner = self.owners.get(&id).copied().ok_or(LockError::NonexistentPosition(id))?;
        self.approvals.remove(&id);
        self.owners.insert(id, to);
        self.debit(owner);
        self.credit(to);
        Ok(())
    }
}
