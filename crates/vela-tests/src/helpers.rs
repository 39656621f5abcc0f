//! Shared helpers for the integration suites.

use vela_core::constants::UNIT;
use vela_core::types::{Address, Timestamp};
use vela_protocol::{Protocol, ProtocolConfig};

/// An epoch-aligned start time (a Thursday 00:00 UTC boundary).
pub const GENESIS: Timestamp = 1_699_488_000;

/// Reward budget minted to the distributor by [`protocol`].
pub const REWARD_FUNDING: u128 = 1_000_000_000 * UNIT;

/// Deterministic account from a label.
pub fn addr(label: &str) -> Address {
    Address::from_label(label)
}

/// The reward token registered by [`protocol`].
pub fn usdc() -> Address {
    addr("usdc")
}

/// A fresh deployment at [`GENESIS`] with `usdc` registered and the
/// distributor funded.
pub fn protocol() -> Protocol {
    let cfg = ProtocolConfig::default();
    let mut p = Protocol::new(cfg.clone(), GENESIS).unwrap();
    p.mint_tokens(usdc(), cfg.distributor, REWARD_FUNDING).unwrap();
    p.register_reward_token(cfg.team, usdc()).unwrap();
    p
}

/// Give `who` `amount` of the locked token.
pub fn fund(p: &mut Protocol, who: Address, amount: u128) {
    let token = p.config().token;
    p.mint_tokens(token, who, amount).unwrap();
}

/// Notify `amount` of `usdc` as the distributor; returns the credited epoch.
pub fn notify(p: &mut Protocol, amount: u128) -> Timestamp {
    let distributor = p.config().distributor;
    p.notify_reward_amount(distributor, usdc(), amount).unwrap()
}

/// Locked-token balance of `who`.
pub fn token_balance(p: &Protocol, who: Address) -> u128 {
    p.balance_of(p.config().token, who)
}
