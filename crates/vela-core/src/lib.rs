//! # vela-core
//! Foundation types, constants and trait seams for the Vela vote-escrow protocol.
//!
//! All arithmetic is integer-only. Token amounts are `u128` base units,
//! timestamps are `u64` seconds.

pub mod config;
pub mod constants;
pub mod epoch;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod math;
pub mod traits;
pub mod types;
