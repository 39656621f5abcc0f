//! Escrow configuration.
//!
//! [`EscrowConfig`] carries the tunable lock parameters. Every field has a
//! default, so a partial JSON document deserializes into a complete config.

use serde::{Deserialize, Serialize};

use crate::constants::{
    BPS_PRECISION, DEFAULT_MAX_PENALTY_BPS, DEFAULT_MIN_LOCK_AMOUNT, DEFAULT_MIN_LOCK_DURATION,
    MAX_LOCK_DURATION,
};
use crate::error::ConfigError;

/// Tunable parameters of the lock ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowConfig {
    /// Smallest amount accepted when opening a lock, in base units.
    pub min_lock_amount: u128,
    /// Shortest lock duration after rounding the end down to an epoch boundary.
    pub min_lock_duration: u64,
    /// Early-exit penalty rate with the full lock duration remaining, in BPS.
    pub max_penalty_bps: u64,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            min_lock_amount: DEFAULT_MIN_LOCK_AMOUNT,
            min_lock_duration: DEFAULT_MIN_LOCK_DURATION,
            max_penalty_bps: DEFAULT_MAX_PENALTY_BPS,
        }
    }
}

impl EscrowConfig {
    /// Check the parameters are mutually consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_penalty_bps > BPS_PRECISION {
            return Err(ConfigError::InvalidPenaltyBps(self.max_penalty_bps));
        }
        if self.min_lock_amount == 0 {
            return Err(ConfigError::ZeroMinLockAmount);
        }
        if self.min_lock_duration > MAX_LOCK_DURATION {
            return Err(ConfigError::MinDurationExceedsMax {
                min: self.min_lock_duration,
                max: MAX_LOCK_DURATION,
            });
        }
        Ok(())
    }
}
