//! Pending-task queue: priority-ordered, deduplicating.
//!
//! Holds at most one task per `(target, kind)` key; enqueueing a duplicate
//! is a silent no-op. Dequeue returns the highest-priority task, oldest
//! first within a priority level. Dedup is an explicit key index next to
//! the task list, not a scan.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::queue_types::{GenerationTask, TaskKey};

#[derive(Default)]
struct QueueInner {
    /// Insertion order; selection happens at dequeue time
    tasks: Vec<GenerationTask>,
    /// Membership index for O(1) dedup
    keys: HashSet<TaskKey>,
}

/// Single-writer from the sweeper; depth reads from UI observers.
#[derive(Default)]
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task unless an equal-key task is already queued.
    /// Returns whether the task was accepted.
    pub fn enqueue(&self, task: GenerationTask) -> bool {
        let mut inner = self.lock();
        let key = task.key();
        if !inner.keys.insert(key) {
            tracing::debug!(key = %key, "Dropping duplicate generation task");
            return false;
        }
        inner.tasks.push(task);
        true
    }

    /// Remove and return the highest-priority task; FIFO within a level.
    pub fn dequeue_next(&self) -> Option<GenerationTask> {
        let mut inner = self.lock();

        let mut best_idx: Option<usize> = None;
        for (idx, task) in inner.tasks.iter().enumerate() {
            match best_idx {
                None => best_idx = Some(idx),
                Some(best) if task.priority > inner.tasks[best].priority => best_idx = Some(idx),
                _ => {}
            }
        }

        let idx = best_idx?;
        let task = inner.tasks.remove(idx);
        inner.keys.remove(&task.key());
        Some(task)
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tasks.is_empty()
    }

    /// Drop everything pending. Shutdown only.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.tasks.len();
        inner.tasks.clear();
        inner.keys.clear();
        dropped
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        // A poisoned queue mutex means a panic mid-push; the queue contents
        // are still structurally valid, so keep going.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
