//! Scheduler services.
//!
//! `sweeper` owns the control loop; everything else is a collaborator it
//! composes: the deduplicating queue, retry bookkeeping, the per-task
//! executor, the per-deck maintenance pipeline, and the suggestion
//! lifecycle surface.

pub mod deck_pipeline;
pub mod executor;
pub mod retry;
pub mod suggestions;
pub mod sweeper;
pub mod task_queue;
