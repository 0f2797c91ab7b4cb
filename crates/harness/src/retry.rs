//! Retry ledger: attempt counts per scenario identity

use std::collections::HashMap;

use tracing::debug;

use crate::identity::ScenarioIdentity;
use crate::scenario::ScenarioStatus;

/// In-memory attempt counter keyed by scenario identity.
///
/// Counts are 1-based and only move down through [`RetryLedger::forgive_attempt`].
#[derive(Debug, Default, Clone)]
pub struct RetryLedger {
    attempts: HashMap<ScenarioIdentity, u32>,
}

impl RetryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of an attempt and return the new attempt number
    pub fn begin_attempt(&mut self, identity: &ScenarioIdentity) -> u32 {
        let count = self.attempts.entry(identity.clone()).or_insert(0);
        *count += 1;
        debug!("Attempt {} of {}", count, identity);
        *count
    }

    /// Attempts recorded so far (0 if the scenario never started)
    pub fn attempts(&self, identity: &ScenarioIdentity) -> u32 {
        self.attempts.get(identity).copied().unwrap_or(0)
    }

    /// Take back one attempt that never completed. Returns whether anything changed.
    pub fn forgive_attempt(&mut self, identity: &ScenarioIdentity) -> bool {
        match self.attempts.get_mut(identity) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.attempts.clear();
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

/// A scenario is on its final attempt when it passed, or when it has used
/// every retry it is allowed. A count past the budget is still final.
pub fn is_final_attempt(status: ScenarioStatus, attempts: u32, max_retry_count: u32) -> bool {
    status == ScenarioStatus::Passed || attempts > max_retry_count
}
