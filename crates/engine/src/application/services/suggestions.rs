//! Suggestion lifecycle: accepting and skipping visible suggestions, and
//! drafting back content for user-entered fronts.
//!
//! Both terminal transitions append a `DeletedSuggestionRecord` so the
//! replenishment phase never re-offers the same front+kind, even when
//! acceptance created a permanent card under a new identity.

use std::sync::Arc;

use recall_domain::{Card, CardId, CardKind, CardState, DeckId, DeletedSuggestionRecord};

use crate::infrastructure::ports::{ClockPort, DeckStore, StoreError, TextGenError, TextGenPort};

#[derive(Debug, thiserror::Error)]
pub enum SuggestionError {
    #[error("Suggestion not found")]
    NotFound,
    #[error("Card is not a visible suggestion (state: {0:?})")]
    NotVisible(CardState),
    #[error("Deck not found")]
    DeckNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    TextGen(#[from] TextGenError),
}

pub struct SuggestionService {
    store: Arc<dyn DeckStore>,
    clock: Arc<dyn ClockPort>,
}

impl SuggestionService {
    pub fn new(store: Arc<dyn DeckStore>, clock: Arc<dyn ClockPort>) -> Self {
        Self { store, clock }
    }

    /// Consume a visible suggestion into a permanent active card. The
    /// suggestion card is deleted; its content and image carry over to a
    /// fresh identity.
    pub async fn accept(&self, suggestion_id: CardId) -> Result<Card, SuggestionError> {
        let suggestion = self.resolve_visible(suggestion_id).await?;

        let mut card = Card::new(
            suggestion.deck_id,
            suggestion.front_text.clone(),
            suggestion.back.clone(),
        );
        card.image_prompt = suggestion.image_prompt.clone();
        card.image = suggestion.image.clone();

        self.record_deletion(&suggestion).await?;
        self.store.save_card(&card).await?;
        self.store.delete_card(suggestion.id).await?;
        self.store.refresh().await?;

        tracing::info!(
            deck_id = %card.deck_id,
            front = %card.front_text,
            "Suggestion accepted as active card"
        );
        Ok(card)
    }

    /// Discard a visible suggestion. The ledger record keeps it from ever
    /// being suggested again for this deck.
    pub async fn skip(&self, suggestion_id: CardId) -> Result<(), SuggestionError> {
        let suggestion = self.resolve_visible(suggestion_id).await?;

        self.record_deletion(&suggestion).await?;
        self.store.delete_card(suggestion.id).await?;
        self.store.refresh().await?;

        tracing::info!(
            deck_id = %suggestion.deck_id,
            front = %suggestion.front_text,
            "Suggestion skipped"
        );
        Ok(())
    }

    /// Draft back content for a user-entered front and persist the new
    /// active card. The image prompt, if any, is picked up by the next
    /// backfill cycle.
    pub async fn create_card_from_front(
        &self,
        text: &dyn TextGenPort,
        deck_id: DeckId,
        front_text: &str,
        kind: CardKind,
    ) -> Result<Card, SuggestionError> {
        let deck = self
            .store
            .get_deck(deck_id)
            .await?
            .ok_or(SuggestionError::DeckNotFound)?;

        let deck_context = format!("{}: {}", deck.name, deck.description);
        let content = text
            .generate_back_content(front_text, &deck_context, kind)
            .await?;

        let mut card = Card::new(deck_id, front_text, content.back);
        if let Some(prompt) = content.image_prompt {
            card.set_image_prompt(prompt);
        }
        self.store.save_card(&card).await?;
        self.store.refresh().await?;
        Ok(card)
    }

    async fn resolve_visible(&self, id: CardId) -> Result<Card, SuggestionError> {
        let card = self
            .store
            .resolve_card(id)
            .await?
            .ok_or(SuggestionError::NotFound)?;
        if card.state != CardState::SuggestionVisible {
            return Err(SuggestionError::NotVisible(card.state));
        }
        Ok(card)
    }

    async fn record_deletion(&self, suggestion: &Card) -> Result<(), StoreError> {
        let record = DeletedSuggestionRecord {
            deck_id: suggestion.deck_id,
            front_text: suggestion.front_text.clone(),
            kind: suggestion.kind(),
            deleted_at: self.clock.now(),
        };
        self.store.append_deleted_suggestion(&record).await
    }
}
