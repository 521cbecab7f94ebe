//! Queue payload types used by the generation scheduler.
//!
//! These DTOs are engine-owned to keep the domain pure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use recall_domain::{CardId, DeckId, TaskId};

/// Scheduling priority for a generation task.
///
/// Totally ordered: `Low < Normal < High < UserRequested`. Anything the
/// user asked for directly outranks pipeline maintenance work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    UserRequested,
}

/// What a generation task produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Deck icon, always via the remote provider
    IconRequest,
    /// Image for an active card
    CardImageRequest,
    /// Image for a suggestion card
    SuggestionImageRequest,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IconRequest => write!(f, "icon"),
            Self::CardImageRequest => write!(f, "card_image"),
            Self::SuggestionImageRequest => write!(f, "suggestion_image"),
        }
    }
}

/// The entity a generation task writes back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTarget {
    Deck(DeckId),
    Card(CardId),
}

impl std::fmt::Display for GenerationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deck(id) => write!(f, "deck:{id}"),
            Self::Card(id) => write!(f, "card:{id}"),
        }
    }
}

/// Dedup key for queue membership and retry bookkeeping.
///
/// The queue holds at most one task per key; retry ordinals are tracked
/// per key across dequeue/re-enqueue cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    pub target: GenerationTarget,
    pub kind: TaskKind,
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.target, self.kind)
    }
}

/// A single unit of generation work. Immutable once created; a retry
/// re-enqueues a logically-equal task (same key) rather than mutating
/// the original.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationTask {
    pub id: TaskId,
    pub kind: TaskKind,
    pub target: GenerationTarget,
    pub prompt: String,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

impl GenerationTask {
    pub fn icon_request(deck_id: DeckId, prompt: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: TaskId::new(),
            kind: TaskKind::IconRequest,
            target: GenerationTarget::Deck(deck_id),
            prompt: prompt.into(),
            priority,
            created_at: Utc::now(),
        }
    }

    pub fn card_image_request(
        card_id: CardId,
        prompt: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: TaskId::new(),
            kind: TaskKind::CardImageRequest,
            target: GenerationTarget::Card(card_id),
            prompt: prompt.into(),
            priority,
            created_at: Utc::now(),
        }
    }

    pub fn suggestion_image_request(
        card_id: CardId,
        prompt: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: TaskId::new(),
            kind: TaskKind::SuggestionImageRequest,
            target: GenerationTarget::Card(card_id),
            prompt: prompt.into(),
            priority,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey {
            target: self.target,
            kind: self.kind,
        }
    }

    /// A logically-equal copy for deferred re-enqueue after a failure.
    /// Same key and prompt, fresh identity and timestamp.
    pub fn retry_clone(&self) -> Self {
        Self {
            id: TaskId::new(),
            kind: self.kind,
            target: self.target,
            prompt: self.prompt.clone(),
            priority: self.priority,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_total_order() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::Normal < Priority::High);
        assert!(Priority::High < Priority::UserRequested);
    }

    #[test]
    fn retry_clone_keeps_key() {
        let task = GenerationTask::card_image_request(CardId::new(), "a dog", Priority::Normal);
        let retry = task.retry_clone();
        assert_eq!(task.key(), retry.key());
        assert_ne!(task.id, retry.id);
    }
}
