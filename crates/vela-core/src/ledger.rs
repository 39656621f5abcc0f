//! In-memory token ledger.
//!
//! [`MemoryTokenLedger`] implements [`TokenLedger`] over a `HashMap` of
//! `(token, account)` balances. It backs the protocol host, the simulator
//! and tests; it has no notion of allowances, so callers authorize movements
//! themselves before invoking [`TokenLedger::transfer`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, MathError};
use crate::traits::TokenLedger;
use crate::types::Address;

/// Balances keyed by `(token, account)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryTokenLedger {
    balances: HashMap<(Address, Address), u128>,
    /// Total issued per token.
    supplies: HashMap<Address, u128>,
}

impl MemoryTokenLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue `amount` of `token` to `to`.
    pub fn mint(&mut self, token: Address, to: Address, amount: u128) -> Result<(), LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        let supply = self.supplies.get(&token).copied().unwrap_or(0);
        let new_supply = supply.checked_add(amount).ok_or(MathError::ArithmeticOverflow)?;
        // Every balance is bounded by the supply, so this cannot overflow.
        *self.balances.entry((token, to)).or_insert(0) += amount;
        self.supplies.insert(token, new_supply);
        Ok(())
    }

    /// Total amount of `token` ever issued.
    pub fn total_issued(&self, token: Address) -> u128 {
        self.supplies.get(&token).copied().unwrap_or(0)
    }
}

impl TokenLedger for MemoryTokenLedger {
    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        let have = self.balance_of(token, from);
        if have < amount {
            return Err(LedgerError::InsufficientBalance { token, account: from, have, need: amount });
        }
        if amount == 0 || from == to {
            return Ok(());
        }
        self.balances.insert((token, from), have - amount);
        *self.balances.entry((token, to)).or_insert(0) += amount;
        Ok(())
    }

    fn balance_of(&self, token: Address, account: Address) -> u128 {
        self.balances.get(&(token, account)).copied().unwrap_or(0)
    }
}
