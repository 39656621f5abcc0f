//! # vela-rewards : Epoch revenue distribution.
//!
//! Revenue notified for a reward token is credited to the next epoch
//! boundary. A position earns a share of each epoch's bucket equal to its
//! voting power at that boundary over the aggregate supply at that boundary.
//!
//! - **Accumulator**: the fractional part of every share is carried forward
//!   in fixed point and paid out once it adds up to whole units.
//! - **Automatic settlement**: the distributor implements
//!   [`PositionHooks`](vela_core::traits::PositionHooks), settling every
//!   registered token before a position changes hands or is burned.
//! - **Self-repay**: owners may redirect payouts to another receiver.
//! - **Team role**: administrative actions belong to a team address rotated
//!   through a propose/accept handshake.

pub mod accrual;
pub mod distributor;
pub mod self_repay;
pub mod team;

pub use accrual::{Accrual, RewardCursor, accrue};
pub use distributor::{Payout, RevenueDistributor, TokenTotals};
pub use self_repay::SelfRepayRegistry;
pub use team::TeamRole;
