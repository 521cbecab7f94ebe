//! Retry bookkeeping for failed generation tasks.
//!
//! Attempt ordinals are tracked per task key in an explicit counter map
//! that survives dequeue/re-enqueue cycles; counting matching tasks still
//! in the queue undercounts once a task is out for execution.

use std::time::Duration;

use dashmap::DashMap;

use crate::queue_types::TaskKey;

/// Escalating delays between attempts; ordinals past the end are terminal.
pub const DEFAULT_RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(60),
    Duration::from_secs(300),
    Duration::from_secs(900),
];

pub struct RetryScheduler {
    attempts: DashMap<TaskKey, u32>,
    delays: Vec<Duration>,
}

impl RetryScheduler {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self {
            attempts: DashMap::new(),
            delays,
        }
    }

    /// Record a failure for `key` and return the delay before the next
    /// attempt, or `None` when the delay table is exhausted and the task
    /// must be dropped permanently.
    pub fn next_delay(&self, key: TaskKey) -> Option<Duration> {
        let mut entry = self.attempts.entry(key).or_insert(0);
        let ordinal = *entry;
        *entry += 1;
        self.delays.get(ordinal as usize).copied()
    }

    /// Forget the ordinal for `key`. Called on success and on every
    /// explicit caller enqueue, so a fresh user request always gets the
    /// full retry budget.
    pub fn reset(&self, key: &TaskKey) {
        self.attempts.remove(key);
    }

    /// Attempts recorded so far for `key` (diagnostics).
    pub fn attempts(&self, key: &TaskKey) -> u32 {
        self.attempts.get(key).map(|entry| *entry).unwrap_or(0)
    }
}

impl Default for RetryScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAYS.to_vec())
    }
}
