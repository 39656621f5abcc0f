//! Cross-crate test suite for Vela.
//!
//! Integration tests drive a full [`Protocol`](vela_protocol::Protocol) the
//! way an integrator would and check the protocol-wide invariants: reward
//! conservation, historical consistency and settlement on ownership change.

pub mod helpers;
