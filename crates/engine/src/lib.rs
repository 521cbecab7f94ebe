//! Recall engine library.
//!
//! Background generation scheduler for the Recall study app: accepts
//! generation requests (deck icons, card images, suggestion images),
//! serializes them through a bounded worker pool with retry and dedup,
//! and keeps every deck supplied with suggestions, images, and an icon
//! via a five-phase maintenance pipeline.
//!
//! ## Structure
//!
//! - `queue_types` - Task, priority, and key DTOs
//! - `application/` - Scheduler loop and services
//! - `infrastructure/` - Ports and provider/store adapters

pub mod application;
pub mod infrastructure;
pub mod queue_types;

/// Shared test doubles for service and integration tests.
#[cfg(test)]
pub mod test_fixtures;

pub use application::services::deck_pipeline::RefreshEvent;
pub use application::services::suggestions::SuggestionService;
pub use application::services::sweeper::{GenerationScheduler, SchedulerStatus};
