//! # vela-escrow : The vote-escrow lock ledger.
//!
//! Users lock a fungible token for up to `MAX_LOCK_DURATION` and receive a
//! non-fungible position whose voting power decays linearly to zero at the
//! lock end. Positions can be topped up, extended, merged, split, made
//! permanent, withdrawn at expiry, or exited early for a penalty.
//!
//! Every voting power change is checkpointed so historical balances and
//! supply are queryable. Ownership changes notify [`PositionHooks`] first,
//! so pending rewards settle to the outgoing owner.
//!
//! [`PositionHooks`]: vela_core::traits::PositionHooks

pub mod escrow;
pub mod registry;

pub use escrow::{VotingEscrow, Withdrawal};
pub use registry::MemoryPositionRegistry;
