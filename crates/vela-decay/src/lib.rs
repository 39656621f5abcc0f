//! # vela-decay : Linear voting power decay and early-exit penalties.
//!
//! All calculations use integer arithmetic only for determinism.
//!
//! - **Linear decay**: a timed lock carries `amount * (end - now) / MAX_LOCK_DURATION`
//!   voting power, computed multiply-before-divide.
//! - **Permanent locks** hold their full amount and never decay.
//! - **Early-exit penalty**: the configured maximum rate scaled by the share of
//!   the lock still remaining, measured from the amount-weighted effective start.
//! - **Weighted effective start**: top-ups and merges average the start
//!   timestamps by amount, so fresh capital cannot inherit an aged clock.

pub mod engine;

pub use engine::DecayEngine;
