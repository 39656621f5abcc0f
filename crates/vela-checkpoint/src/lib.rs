//! # vela-checkpoint : Voting power curves and historical queries.
//!
//! Voting power is a piecewise-linear function of time. Each entity (the
//! global aggregate and every position) keeps an append-only history of
//! curve [`Point`]s; the global curve additionally consults a sparse
//! [`SlopeSchedule`] of slope changes that take effect at lock ends.
//!
//! - **Scaled units**: bias and slope are stored multiplied by
//!   `MAX_LOCK_DURATION`, so a lock contributes `slope = amount` and the
//!   aggregate is an exact sum of its positions.
//! - **Forward fill** walks only the scheduled boundaries between the last
//!   point and the target time.
//! - **Lookup** binary-searches the point history.

pub mod engine;
pub mod history;
pub mod point;
pub mod schedule;

pub use engine::CheckpointEngine;
pub use history::PointHistory;
pub use point::{Point, scaled_curve};
pub use schedule::SlopeSchedule;
