//! Core protocol types: addresses, positions and lock records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AddressError;

/// Identifier of a lock position. Allocated sequentially starting at 1.
pub type PositionId = u64;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// A 32-byte account or token identifier.
///
/// Accounts, reward tokens and custody accounts share this type.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// The zero address. Rejected wherever a real account is required.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create an Address from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Deterministic address for a human-readable label (BLAKE3 of the label).
    ///
    /// # Examples
    ///
    /// ```
    /// use vela_core::types::Address;
    /// assert_eq!(Address::from_label("alice"), Address::from_label("alice"));
    /// assert_ne!(Address::from_label("alice"), Address::from_label("bob"));
    /// ```
    pub fn from_label(label: &str) -> Self {
        Self(*blake3::hash(label.as_bytes()).as_bytes())
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    /// Parse a 64-digit hex string, with or without a `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| AddressError::InvalidLength(b.len()))?;
        Ok(Self(array))
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Lock state of one position.
///
/// A timed lock decays linearly to zero at `end` (always an epoch boundary).
/// A permanent lock has `end == 0` and never decays.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct LockedBalance {
    /// Locked amount in base units.
    pub amount: u128,
    /// Timestamp at which voting power reaches zero; `0` for permanent locks.
    pub end: Timestamp,
    /// Whether the lock is permanent (no decay).
    pub is_permanent: bool,
    /// Start used for penalty ratios. Amount-weighted across top-ups and merges.
    pub effective_start: Timestamp,
}

impl LockedBalance {
    /// A timed lock.
    pub fn timed(amount: u128, end: Timestamp, effective_start: Timestamp) -> Self {
        Self { amount, end, is_permanent: false, effective_start }
    }

    /// A permanent lock.
    pub fn permanent(amount: u128, effective_start: Timestamp) -> Self {
        Self { amount, end: 0, is_permanent: true, effective_start }
    }

    /// Whether a timed lock has reached its end. Permanent locks never expire.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        !self.is_permanent && self.end <= now
    }

    /// The portion of `amount` held in the non-decaying permanent pool.
    pub fn permanent_amount(&self) -> u128 {
        if self.is_permanent { self.amount } else { 0 }
    }

    /// Seconds until `end`, zero once expired or for permanent locks.
    pub fn remaining(&self, now: Timestamp) -> u64 {
        if self.is_permanent { 0 } else { self.end.saturating_sub(now) }
    }
}
