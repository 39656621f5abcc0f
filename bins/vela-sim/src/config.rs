//! Simulator configuration.
//!
//! Loaded from an optional JSON file; missing fields take their defaults.
//! `VELA_LOG_LEVEL`, `VELA_LOG_FORMAT` and `VELA_GENESIS` override the file.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use vela_core::config::EscrowConfig;
use vela_core::epoch::is_epoch_boundary;
use vela_core::types::{Address, Timestamp};
use vela_protocol::ProtocolConfig;

/// Labels of the fixed protocol accounts. Scenario steps refer to accounts by
/// the same labels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Roles {
    pub token: String,
    pub escrow_account: String,
    pub treasury: String,
    pub rewards_account: String,
    pub distributor: String,
    pub team: String,
}

impl Default for Roles {
    fn default() -> Self {
        Self {
            token: "vela".into(),
            escrow_account: "vela.escrow".into(),
            treasury: "vela.treasury".into(),
            rewards_account: "vela.rewards".into(),
            distributor: "vela.distributor".into(),
            team: "vela.team".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Log filter (e.g. "info", "vela_escrow=debug").
    pub log_level: String,
    /// "text" or "json".
    pub log_format: String,
    /// Clock value before the first step.
    pub genesis: Timestamp,
    pub escrow: EscrowConfig,
    pub roles: Roles,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: "text".into(),
            genesis: 1_699_488_000,
            escrow: EscrowConfig::default(),
            roles: Roles::default(),
        }
    }
}

impl SimConfig {
    /// Read `path` if given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `VELA_*` overrides looked up through `var`.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(level) = var("VELA_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(format) = var("VELA_LOG_FORMAT") {
            self.log_format = format;
        }
        if let Some(genesis) = var("VELA_GENESIS") {
            self.genesis = genesis.parse().context("VELA_GENESIS must be a unix timestamp")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_format != "text" && self.log_format != "json" {
            bail!("log_format must be \"text\" or \"json\", got {:?}", self.log_format);
        }
        if !is_epoch_boundary(self.genesis) {
            tracing::warn!(genesis = self.genesis, "genesis is not on an epoch boundary");
        }
        self.protocol_config().validate().context("invalid protocol configuration")?;
        Ok(())
    }

    /// Resolve role labels into a deployable configuration.
    pub fn protocol_config(&self) -> ProtocolConfig {
        ProtocolConfig {
            escrow: self.escrow.clone(),
            token: Address::from_label(&self.roles.token),
            escrow_account: Address::from_label(&self.roles.escrow_account),
            treasury: Address::from_label(&self.roles.treasury),
            rewards_account: Address::from_label(&self.roles.rewards_account),
            distributor: Address::from_label(&self.roles.distributor),
            team: Address::from_label(&self.roles.team),
        }
    }
}
