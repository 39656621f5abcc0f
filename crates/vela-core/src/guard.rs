//! Non-reentrancy flag.
//!
//! Execution is single-threaded, so the guard is a plain boolean rather than a
//! lock. It is set for the duration of any call path that reaches an external
//! collaborator (token ledger, lifecycle hooks) and rejects nested entry.

use serde::{Deserialize, Serialize};

/// Per-component reentrancy flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReentrancyGuard {
    entered: bool,
}

impl ReentrancyGuard {
    /// Create an unlocked guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the guarded section as entered.
    ///
    /// Returns `false` without changing state if the section is already active.
    #[must_use]
    pub fn enter(&mut self) -> bool {
        if self.entered {
            return false;
        }
        self.entered = true;
        true
    }

    /// Leave the guarded section.
    pub fn exit(&mut self) {
        self.entered = false;
    }

    /// Whether a guarded section is currently active.
    pub fn is_entered(&self) -> bool {
        self.entered
    }
}
