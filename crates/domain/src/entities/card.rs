//! Card entity - a single piece of study content with front/back and optional image

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{CardId, DeckId};

/// Raw image bytes plus their encoded format ("png", "jpeg", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBlob {
    pub data: Vec<u8>,
    pub format: String,
}

/// The kind of content carried on a card back.
///
/// This is the dedup axis: two cards with the same front text but different
/// kinds are different cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardKind {
    Vocabulary,
    Conjugation,
    Fact,
}

impl std::fmt::Display for CardKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vocabulary => write!(f, "vocabulary"),
            Self::Conjugation => write!(f, "conjugation"),
            Self::Fact => write!(f, "fact"),
        }
    }
}

impl std::str::FromStr for CardKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vocabulary" | "vocab" => Ok(Self::Vocabulary),
            "conjugation" => Ok(Self::Conjugation),
            "fact" => Ok(Self::Fact),
            other => Err(DomainError::validation(format!(
                "Unknown card kind: {other}"
            ))),
        }
    }
}

/// Back-of-card content, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CardBack {
    Vocabulary {
        translation: String,
        example_sentence: Option<String>,
    },
    Conjugation {
        /// Form name -> conjugated form, in presentation order
        forms: Vec<(String, String)>,
    },
    Fact {
        text: String,
    },
}

impl CardBack {
    pub fn kind(&self) -> CardKind {
        match self {
            Self::Vocabulary { .. } => CardKind::Vocabulary,
            Self::Conjugation { .. } => CardKind::Conjugation,
            Self::Fact { .. } => CardKind::Fact,
        }
    }
}

/// Lifecycle state of a card.
///
/// Suggestions pass through `SuggestionPending` (created, no image yet) and
/// `SuggestionVisible` (shown to the user) before either being accepted as
/// an `Active` card or skipped. There is no transition back from visible
/// to pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardState {
    Active,
    Archived,
    SuggestionPending,
    SuggestionVisible,
}

/// A single piece of study content.
///
/// `consecutive_image_failures` gates image-generation scans: past the
/// configured threshold the card is skipped until the prompt is edited
/// (which resets the counter) or the user explicitly regenerates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub deck_id: DeckId,
    pub front_text: String,
    pub back: CardBack,
    pub image_prompt: Option<String>,
    pub image: Option<ImageBlob>,
    pub state: CardState,
    pub consecutive_image_failures: u32,
    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn new(deck_id: DeckId, front_text: impl Into<String>, back: CardBack) -> Self {
        Self {
            id: CardId::new(),
            deck_id,
            front_text: front_text.into(),
            back,
            image_prompt: None,
            image: None,
            state: CardState::Active,
            consecutive_image_failures: 0,
            created_at: Utc::now(),
        }
    }

    /// Create a pending suggestion drafted by the text provider.
    pub fn new_suggestion(
        deck_id: DeckId,
        front_text: impl Into<String>,
        back: CardBack,
        image_prompt: Option<String>,
    ) -> Self {
        Self {
            id: CardId::new(),
            deck_id,
            front_text: front_text.into(),
            back,
            image_prompt,
            image: None,
            state: CardState::SuggestionPending,
            consecutive_image_failures: 0,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> CardKind {
        self.back.kind()
    }

    pub fn is_suggestion(&self) -> bool {
        matches!(
            self.state,
            CardState::SuggestionPending | CardState::SuggestionVisible
        )
    }

    /// Whether image generation may be attempted for this card.
    pub fn image_attempts_exhausted(&self, threshold: u32) -> bool {
        self.consecutive_image_failures >= threshold
    }

    pub fn record_image_failure(&mut self) {
        self.consecutive_image_failures = self.consecutive_image_failures.saturating_add(1);
    }

    /// Update the image prompt, re-arming the failure gate.
    pub fn set_image_prompt(&mut self, prompt: impl Into<String>) {
        self.image_prompt = Some(prompt.into());
        self.consecutive_image_failures = 0;
    }

    pub fn attach_image(&mut self, image: ImageBlob) {
        self.image = Some(image);
        self.consecutive_image_failures = 0;
    }

    /// Promote a pending suggestion to visible. The only way a suggestion
    /// leaves the invisible state.
    pub fn promote_to_visible(&mut self) -> Result<(), DomainError> {
        match self.state {
            CardState::SuggestionPending => {
                self.state = CardState::SuggestionVisible;
                Ok(())
            }
            other => Err(DomainError::invalid_transition(format!(
                "cannot promote card in state {other:?} to SuggestionVisible"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact_card() -> Card {
        Card::new(
            DeckId::new(),
            "Casa",
            CardBack::Fact {
                text: "House in Spanish".to_string(),
            },
        )
    }

    #[test]
    fn failure_gate_arms_at_threshold() {
        let mut card = fact_card();
        card.record_image_failure();
        card.record_image_failure();
        assert!(!card.image_attempts_exhausted(3));
        card.record_image_failure();
        assert!(card.image_attempts_exhausted(3));
    }

    #[test]
    fn editing_prompt_resets_failure_counter() {
        let mut card = fact_card();
        card.record_image_failure();
        card.record_image_failure();
        card.set_image_prompt("a red brick house");
        assert_eq!(card.consecutive_image_failures, 0);
        assert!(!card.image_attempts_exhausted(1));
    }

    #[test]
    fn promote_requires_pending_state() {
        let mut card = fact_card();
        assert!(card.promote_to_visible().is_err());

        let mut suggestion = Card::new_suggestion(
            DeckId::new(),
            "Perro",
            CardBack::Vocabulary {
                translation: "Dog".to_string(),
                example_sentence: None,
            },
            Some("a happy dog".to_string()),
        );
        suggestion.promote_to_visible().expect("pending promotes");
        assert_eq!(suggestion.state, CardState::SuggestionVisible);
        // No transition back, and no double promotion
        assert!(suggestion.promote_to_visible().is_err());
    }

    #[test]
    fn card_back_round_trips_with_kind_tag() {
        let back = CardBack::Vocabulary {
            translation: "House".to_string(),
            example_sentence: Some("Mi casa es grande.".to_string()),
        };
        let json = serde_json::to_value(&back).expect("serializes");
        // The tag is the wire contract the provider parsers rely on
        assert_eq!(json["type"], "vocabulary");
        let round: CardBack = serde_json::from_value(json).expect("deserializes");
        assert_eq!(round, back);

        let state = serde_json::to_value(CardState::SuggestionVisible).expect("serializes");
        assert_eq!(state, "suggestion_visible");
    }

    #[test]
    fn kind_follows_back_content() {
        let card = fact_card();
        assert_eq!(card.kind(), CardKind::Fact);
        assert_eq!(card.kind().to_string(), "fact");
        assert_eq!("Vocabulary".parse::<CardKind>().ok(), Some(CardKind::Vocabulary));
    }
}
