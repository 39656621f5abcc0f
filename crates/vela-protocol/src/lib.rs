//! # vela-protocol : Host composition.
//!
//! [`Protocol`] owns the lock ledger, the revenue distributor and the token
//! ledger, drives a monotonic clock and runs every call atomically: a failed
//! call leaves no trace.
//!
//! The distributor is wired into the lock ledger as its
//! [`PositionHooks`](vela_core::traits::PositionHooks), so ownership changes
//! settle rewards automatically.

pub mod config;
pub mod protocol;
pub mod snapshot;

pub use config::ProtocolConfig;
pub use protocol::Protocol;
