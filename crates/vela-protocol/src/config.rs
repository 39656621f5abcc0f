//! Deployment parameters for a [`Protocol`](crate::Protocol) instance.

use serde::{Deserialize, Serialize};

use vela_core::config::EscrowConfig;
use vela_core::error::ConfigError;
use vela_core::types::Address;

/// Lock parameters plus the fixed accounts and roles of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub escrow: EscrowConfig,
    /// The locked token.
    pub token: Address,
    /// Custody account of the lock ledger.
    pub escrow_account: Address,
    /// Receives early-exit penalties.
    pub treasury: Address,
    /// Custody account of the revenue distributor.
    pub rewards_account: Address,
    /// Initial reward notifier.
    pub distributor: Address,
    /// Initial team.
    pub team: Address,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            escrow: EscrowConfig::default(),
            token: Address::from_label("vela"),
            escrow_account: Address::from_label("vela.escrow"),
            treasury: Address::from_label("vela.treasury"),
            rewards_account: Address::from_label("vela.rewards"),
            distributor: Address::from_label("vela.distributor"),
            team: Address::from_label("vela.team"),
        }
    }
}

impl ProtocolConfig {
    /// Validate the lock parameters and reject zero or shared custody accounts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.escrow.validate()?;
        for (name, addr) in [
            ("token", self.token),
            ("escrow account", self.escrow_account),
            ("treasury", self.treasury),
            ("rewards account", self.rewards_account),
            ("distributor", self.distributor),
            ("team", self.team),
        ] {
            if addr.is_zero() {
                return Err(ConfigError::ZeroAddress(name));
            }
        }
        if self.escrow_account == self.rewards_account {
            return Err(ConfigError::SharedCustody);
        }
        Ok(())
    }
}
