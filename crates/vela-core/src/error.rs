//! Error types for the Vela protocol.
use thiserror::Error;

use crate::types::{Address, PositionId, Timestamp};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error("division by zero")] DivisionByZero,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid hex: {0}")] InvalidHex(String),
    #[error("invalid length: {0} bytes")] InvalidLength(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max penalty {0} bps exceeds 10000")] InvalidPenaltyBps(u64),
    #[error("minimum lock amount must be non-zero")] ZeroMinLockAmount,
    #[error("minimum lock duration {min} exceeds maximum {max}")] MinDurationExceedsMax { min: u64, max: u64 },
    #[error("{0} must not be the zero address")] ZeroAddress(&'static str),
    #[error("escrow and rewards must use distinct custody accounts")] SharedCustody,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance of {token} for {account}: have {have}, need {need}")]
    InsufficientBalance { token: Address, account: Address, have: u128, need: u128 },
    #[error("zero address")] ZeroAddress,
    #[error(transparent)] Math(#[from] MathError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("point at {ts} precedes last recorded point at {last}")] OutOfOrder { last: Timestamp, ts: Timestamp },
    #[error(transparent)] Math(#[from] MathError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewardError {
    #[error("token not registered for rewards: {0}")] UnregisteredToken(Address),
    #[error("token already registered: {0}")] TokenAlreadyRegistered(Address),
    #[error("claim end {end} is after current time {now}")] FutureTimestamp { end: Timestamp, now: Timestamp },
    #[error("zero amount")] ZeroAmount,
    #[error("zero address")] ZeroAddress,
    #[error("no such position: {0}")] NonexistentPosition(PositionId),
    #[error("caller {caller} is not the owner of position {id}")] NotOwner { caller: Address, id: PositionId },
    #[error("caller {caller} is not approved for position {id}")] NotApprovedOrOwner { caller: Address, id: PositionId },
    #[error("caller {0} is not the reward distributor")] NotDistributor(Address),
    #[error("caller {0} is not the team")] NotTeam(Address),
    #[error("caller {0} is not the pending team")] NotPendingTeam(Address),
    #[error("no pending team proposal")] NoPendingTeam,
    #[error("proposed team equals current team")] SameTeam,
    #[error("no receiver set for position {0}")] ReceiverNotSet(PositionId),
    #[error("nothing to sweep for token {0}")] NothingToSweep(Address),
    #[error("reentrant call")] Reentrant,
    #[error(transparent)] Math(#[from] MathError),
    #[error(transparent)] Ledger(#[from] LedgerError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("amount {amount} below minimum {min}")] AmountTooSmall { amount: u128, min: u128 },
    #[error("zero amount")] ZeroAmount,
    #[error("lock duration {duration}s below minimum {min}s")] DurationTooShort { duration: u64, min: u64 },
    #[error("lock duration {duration}s above maximum {max}s")] DurationTooLong { duration: u64, max: u64 },
    #[error("new unlock time {requested} precedes current {current}")] UnlockTimeDecreased { current: Timestamp, requested: Timestamp },
    #[error("lock {0} has expired")] LockExpired(PositionId),
    #[error("lock {0} has not expired")] LockNotExpired(PositionId),
    #[error("lock {0} is permanent")] PermanentLock(PositionId),
    #[error("lock {0} is not permanent")] NotPermanentLock(PositionId),
    #[error("cannot merge lock {0} into itself")] SameLock(PositionId),
    #[error("split amount {amount} must be strictly between 0 and {locked}")] InvalidSplitAmount { amount: u128, locked: u128 },
    #[error("no such position: {0}")] NonexistentPosition(PositionId),
    #[error("position already minted: {0}")] AlreadyMinted(PositionId),
    #[error("caller {caller} is not the owner of position {id}")] NotOwner { caller: Address, id: PositionId },
    #[error("caller {caller} is not approved for position {id}")] NotApprovedOrOwner { caller: Address, id: PositionId },
    #[error("zero address")] ZeroAddress,
    #[error("reentrant call")] Reentrant,
    #[error(transparent)] Math(#[from] MathError),
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error(transparent)] Checkpoint(#[from] CheckpointError),
    #[error("reward settlement: {0}")] Reward(#[from] RewardError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VelaError {
    #[error(transparent)] Lock(#[from] LockError),
    #[error(transparent)] Reward(#[from] RewardError),
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error(transparent)] Checkpoint(#[from] CheckpointError),
    #[error(transparent)] Math(#[from] MathError),
    #[error(transparent)] Config(#[from] ConfigError),
    #[error(transparent)] Address(#[from] AddressError),
    #[error("clock moved backwards: now {now}, requested {requested}")] ClockRegression { now: Timestamp, requested: Timestamp },
    #[error("snapshot: {0}")] Snapshot(String),
}
