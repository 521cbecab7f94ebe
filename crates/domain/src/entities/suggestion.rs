//! Suggestion dedup ledger types
//!
//! A deck must never be offered the same suggestion twice. The dedup key is
//! the case-insensitive front text plus the card kind; the ledger of deleted
//! suggestions is append-only and consulted on every replenishment scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::card::{Card, CardKind};
use crate::ids::DeckId;

/// Case-insensitive `(front text, kind)` dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuggestionKey {
    front_lower: String,
    kind: CardKind,
}

impl SuggestionKey {
    pub fn new(front_text: &str, kind: CardKind) -> Self {
        Self {
            front_lower: front_text.trim().to_lowercase(),
            kind,
        }
    }

    pub fn front_lower(&self) -> &str {
        &self.front_lower
    }

    pub fn kind(&self) -> CardKind {
        self.kind
    }
}

impl From<&Card> for SuggestionKey {
    fn from(card: &Card) -> Self {
        Self::new(&card.front_text, card.kind())
    }
}

/// Append-only record of a suggestion the user consumed or skipped.
///
/// Matching candidates must never be regenerated for the same deck, even
/// when consuming the suggestion created a permanent card under a new
/// identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedSuggestionRecord {
    pub deck_id: DeckId,
    pub front_text: String,
    pub kind: CardKind,
    pub deleted_at: DateTime<Utc>,
}

impl DeletedSuggestionRecord {
    pub fn new(deck_id: DeckId, front_text: impl Into<String>, kind: CardKind) -> Self {
        Self {
            deck_id,
            front_text: front_text.into(),
            kind,
            deleted_at: Utc::now(),
        }
    }

    pub fn key(&self) -> SuggestionKey {
        SuggestionKey::new(&self.front_text, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_case_insensitive() {
        let a = SuggestionKey::new("Casa", CardKind::Vocabulary);
        let b = SuggestionKey::new("casa", CardKind::Vocabulary);
        let c = SuggestionKey::new("  CASA ", CardKind::Vocabulary);
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn key_distinguishes_kind() {
        let vocab = SuggestionKey::new("ser", CardKind::Vocabulary);
        let conj = SuggestionKey::new("ser", CardKind::Conjugation);
        assert_ne!(vocab, conj);
    }

    #[test]
    fn record_key_round_trips() {
        let record = DeletedSuggestionRecord::new(DeckId::new(), "Perro", CardKind::Vocabulary);
        assert_eq!(
            record.key(),
            SuggestionKey::new("perro", CardKind::Vocabulary)
        );
    }
}
