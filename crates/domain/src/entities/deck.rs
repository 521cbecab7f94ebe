//! Deck entity - a named collection of cards sharing a suggestion target and an icon

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::card::ImageBlob;
use crate::ids::DeckId;

/// Default number of suggestions the pipeline keeps a deck supplied with.
pub const DEFAULT_SUGGESTION_TARGET: u32 = 5;

/// A named collection of cards.
///
/// Cards are owned by the persistent store and fetched per deck; the deck
/// itself only carries its identity, presentation fields, and the
/// suggestion target the maintenance pipeline drives toward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deck {
    pub id: DeckId,
    pub name: String,
    pub description: String,
    pub icon_image: Option<ImageBlob>,
    /// Desired count of visible + pending suggestions for this deck
    pub suggestion_target: u32,
    pub created_at: DateTime<Utc>,
}

impl Deck {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: DeckId::new(),
            name: name.into(),
            description: description.into(),
            icon_image: None,
            suggestion_target: DEFAULT_SUGGESTION_TARGET,
            created_at: Utc::now(),
        }
    }

    pub fn with_suggestion_target(mut self, target: u32) -> Self {
        self.suggestion_target = target;
        self
    }

    pub fn has_icon(&self) -> bool {
        self.icon_image.is_some()
    }
}
