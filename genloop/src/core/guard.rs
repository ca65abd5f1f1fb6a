//! Bounded-retry policy for repair attempts.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// Decides whether another repair attempt is permitted.
///
/// The guard only reads the iteration counter. Repair steps own the increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationGuard {
    pub max_iterations: u32,
}

impl Default for IterationGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITERATIONS)
    }
}

impl IterationGuard {
    pub fn new(max_iterations: u32) -> Self {
        Self { max_iterations }
    }

    pub fn may_retry(&self, iteration_count: u32) -> bool {
        iteration_count < self.max_iterations
    }

    pub fn remaining(&self, iteration_count: u32) -> u32 {
        self.max_iterations.saturating_sub(iteration_count)
    }
}
